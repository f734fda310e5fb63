use crate::engine::core::settings::GallerySettings;
use bevy::asset::LoadState;
use bevy::prelude::*;
use bevy::render::render_resource::TextureFormat;
use bevy::tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tile_atlas::source::is_remote;
use tile_atlas::{FetchError, Fit, RgbaPixels};

pub type FetchResult = Result<RgbaPixels, FetchError>;

/// One image on its way in, resized to its final fit before it resolves.
pub enum PendingImage {
    /// Loading through the asset server.
    Asset {
        path: String,
        handle: Handle<Image>,
        fit: Fit,
    },
    /// Loaded, being resized on the compute pool.
    Fitting(Task<FetchResult>),
    /// Fetched over HTTP off the main thread.
    Remote { url: String, reply: Mutex<Receiver<FetchResult>> },
}

impl PendingImage {
    /// Advances the fetch without blocking; returns the result once final.
    pub fn poll(&mut self, asset_server: &AssetServer, images: &Assets<Image>) -> Option<FetchResult> {
        match self {
            PendingImage::Asset { path, handle, fit } => match asset_server.load_state(&*handle) {
                LoadState::Loaded => {
                    let fit = *fit;
                    let pixels = images
                        .get(&*handle)
                        .ok_or_else(|| FetchError::Unsupported(path.clone()))
                        .and_then(|image| image_pixels(image, path));
                    match pixels {
                        Ok(pixels) => {
                            let task = AsyncComputeTaskPool::get().spawn(async move { fit.apply(pixels) });
                            *self = PendingImage::Fitting(task);
                            None
                        }
                        Err(err) => Some(Err(err)),
                    }
                }
                LoadState::Failed(err) => Some(Err(FetchError::Transport {
                    url: path.clone(),
                    message: err.to_string(),
                })),
                _ => None,
            },
            PendingImage::Fitting(task) => block_on(future::poll_once(task)),
            PendingImage::Remote { url, reply } => poll_reply(url, reply),
        }
    }
}

fn poll_reply(url: &str, reply: &mut Mutex<Receiver<FetchResult>>) -> Option<FetchResult> {
    let reply = reply.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
    match reply.try_recv() {
        Ok(result) => Some(result),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => Some(Err(FetchError::Transport {
            url: url.to_string(),
            message: "fetch worker stopped".to_string(),
        })),
    }
}

/// Copies RGBA8 pixel data out of a loaded image.
fn image_pixels(image: &Image, path: &str) -> FetchResult {
    let format = image.texture_descriptor.format;
    match (&image.data, format) {
        (Some(data), TextureFormat::Rgba8UnormSrgb | TextureFormat::Rgba8Unorm) => Ok(RgbaPixels {
            width: image.width(),
            height: image.height(),
            data: data.clone(),
        }),
        _ => Err(FetchError::Unsupported(format!("{path} ({format:?})"))),
    }
}

/// Starts image fetches. Paths relative to the asset folder go through the
/// asset server on every target; HTTP(S) URLs go to background threads
/// natively and to the browser's fetch on the web.
#[derive(Resource)]
pub struct ImageFetcher {
    asset_root: String,
    #[cfg(not(target_arch = "wasm32"))]
    workers: Option<native::RemoteWorkers>,
    #[cfg(target_arch = "wasm32")]
    retry: tile_atlas::RetryPolicy,
}

impl ImageFetcher {
    pub fn from_settings(settings: &GallerySettings) -> Self {
        Self {
            asset_root: settings.asset_root.clone(),
            #[cfg(not(target_arch = "wasm32"))]
            workers: native::RemoteWorkers::spawn(constants::texture::REMOTE_FETCH_WORKERS, settings.retry_policy())
                .inspect_err(|e| warn!("HTTP images disabled: {e}"))
                .ok(),
            #[cfg(target_arch = "wasm32")]
            retry: settings.retry_policy(),
        }
    }

    pub fn start(&self, url: &str, fit: Fit, asset_server: &AssetServer) -> PendingImage {
        if is_remote(url) {
            return PendingImage::Remote {
                url: url.to_string(),
                reply: Mutex::new(self.fetch_remote(url.to_string(), fit)),
            };
        }
        let path = self.asset_path(url);
        PendingImage::Asset {
            handle: asset_server.load(path.clone()),
            path,
            fit,
        }
    }

    /// Asset server path for a non-HTTP image URL.
    pub fn asset_path(&self, url: &str) -> String {
        let relative = url.strip_prefix("file://").unwrap_or(url).trim_start_matches('/');
        match self.asset_root.trim_matches('/') {
            "" => relative.to_string(),
            root => format!("{root}/{relative}"),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn fetch_remote(&self, url: String, fit: Fit) -> Receiver<FetchResult> {
        let (reply, receiver) = mpsc::channel();
        match &self.workers {
            Some(workers) => workers.submit(native::RemoteJob { url, fit, reply }),
            None => {
                let _ = reply.send(Err(FetchError::Unsupported(url)));
            }
        }
        receiver
    }

    #[cfg(target_arch = "wasm32")]
    fn fetch_remote(&self, url: String, fit: Fit) -> Receiver<FetchResult> {
        let (reply, receiver) = mpsc::channel();
        let retry = self.retry;
        wasm_bindgen_futures::spawn_local(async move {
            let result = browser::fetch_with_retry(&url, retry)
                .await
                .and_then(|bytes| tile_atlas::decode_rgba(&bytes))
                .and_then(|pixels| fit.apply(pixels));
            let _ = reply.send(result);
        });
        receiver
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::FetchResult;
    use std::sync::mpsc::{self, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tile_atlas::source::{HttpSource, fetch_with_retry};
    use tile_atlas::{FetchError, Fit, RetryPolicy, decode_rgba};

    pub struct RemoteJob {
        pub url: String,
        pub fit: Fit,
        pub reply: Sender<FetchResult>,
    }

    /// Fixed set of threads draining one job queue. Blocking HTTP, retry
    /// backoff and decoding all happen here, never on the Bevy task pools.
    pub struct RemoteWorkers {
        jobs: Sender<RemoteJob>,
    }

    impl RemoteWorkers {
        pub fn spawn(count: usize, retry: RetryPolicy) -> Result<Self, FetchError> {
            let http = HttpSource::new(Duration::from_secs(constants::texture::FETCH_TIMEOUT_SECONDS))?;
            let (jobs, queue) = mpsc::channel::<RemoteJob>();
            let queue = Arc::new(Mutex::new(queue));

            for index in 0..count.max(1) {
                let queue = Arc::clone(&queue);
                let http = http.clone();
                std::thread::Builder::new()
                    .name(format!("image-fetch-{index}"))
                    .spawn(move || {
                        loop {
                            let next = match queue.lock() {
                                Ok(guard) => guard.recv(),
                                Err(_) => return,
                            };
                            // Sender gone: the fetcher was dropped.
                            let Ok(job) = next else {
                                return;
                            };
                            let result = fetch_with_retry(&http, &job.url, retry)
                                .and_then(|bytes| decode_rgba(&bytes))
                                .and_then(|pixels| job.fit.apply(pixels));
                            let _ = job.reply.send(result);
                        }
                    })
                    .map_err(|e| FetchError::Transport {
                        url: String::new(),
                        message: format!("cannot start fetch worker: {e}"),
                    })?;
            }
            Ok(Self { jobs })
        }

        pub fn submit(&self, job: RemoteJob) {
            if let Err(mpsc::SendError(job)) = self.jobs.send(job) {
                let _ = job.reply.send(Err(FetchError::Transport {
                    url: job.url,
                    message: "fetch workers stopped".to_string(),
                }));
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod browser {
    use tile_atlas::{FetchError, RetryPolicy};

    // No timers to sleep on here, so retries go out back to back.
    pub async fn fetch_with_retry(url: &str, retry: RetryPolicy) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1;
        loop {
            match fetch(url).await {
                Err(err) if err.is_transient() && attempt < retry.attempts.max(1) => {
                    bevy::log::debug!("retrying {url} after attempt {attempt}: {err}");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn fetch(url: &str) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = reqwest::get(url).await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await.map_err(transport)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(asset_root: &str) -> ImageFetcher {
        ImageFetcher {
            asset_root: asset_root.to_string(),
            #[cfg(not(target_arch = "wasm32"))]
            workers: None,
            #[cfg(target_arch = "wasm32")]
            retry: tile_atlas::RetryPolicy::default(),
        }
    }

    #[test]
    fn relative_urls_resolve_under_the_asset_root() {
        assert_eq!(fetcher("").asset_path("thumbs/1.jpg"), "thumbs/1.jpg");
        assert_eq!(fetcher("gallery/").asset_path("/thumbs/1.jpg"), "gallery/thumbs/1.jpg");
        assert_eq!(fetcher("gallery").asset_path("file://thumbs/1.jpg"), "gallery/thumbs/1.jpg");
    }

    #[test]
    fn remote_results_arrive_through_polling() {
        let url = "https://example.com/1.jpg";
        let (reply, receiver) = mpsc::channel();
        let mut receiver = Mutex::new(receiver);

        assert!(poll_reply(url, &mut receiver).is_none());
        reply
            .send(Ok(RgbaPixels {
                width: 1,
                height: 1,
                data: vec![1, 2, 3, 4],
            }))
            .unwrap();
        assert_eq!(poll_reply(url, &mut receiver).unwrap().unwrap().data, vec![1, 2, 3, 4]);

        drop(reply);
        assert!(matches!(poll_reply(url, &mut receiver), Some(Err(FetchError::Transport { .. }))));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn remote_fetches_without_workers_fail_fast() {
        let receiver = fetcher("").fetch_remote("https://example.com/3.jpg".to_string(), Fit::Cover(8));
        assert!(matches!(receiver.try_recv(), Ok(Err(FetchError::Unsupported(_)))));
    }

    #[test]
    fn only_rgba8_images_are_copied() {
        let rgba = Image::new_fill(
            bevy::render::render_resource::Extent3d {
                width: 2,
                height: 1,
                depth_or_array_layers: 1,
            },
            bevy::render::render_resource::TextureDimension::D2,
            &[9, 8, 7, 255],
            TextureFormat::Rgba8UnormSrgb,
            bevy::asset::RenderAssetUsages::MAIN_WORLD,
        );
        let pixels = image_pixels(&rgba, "a.png").unwrap();
        assert_eq!((pixels.width, pixels.height), (2, 1));
        assert_eq!(pixels.data, vec![9, 8, 7, 255, 9, 8, 7, 255]);

        let mut float = rgba.clone();
        float.texture_descriptor.format = TextureFormat::Rgba32Float;
        assert!(matches!(image_pixels(&float, "b.exr"), Err(FetchError::Unsupported(_))));
    }
}
