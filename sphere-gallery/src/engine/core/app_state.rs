use crate::engine::atlas::atlas_manager::{AtlasManager, PlatformLimits};
use crate::engine::events::GalleryErrorRaised;
use crate::engine::loading::progress::LoadingProgress;
use crate::error::GalleryError;
use bevy::prelude::*;
use bevy::render::renderer::RenderDevice;
use constants::texture::RENDER_INIT_TIMEOUT_SECONDS;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States, Resource)]
pub enum GalleryState {
    #[default]
    Loading,
    Running,
    Failed,
}

impl GalleryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GalleryState::Loading => "loading",
            GalleryState::Running => "running",
            GalleryState::Failed => "failed",
        }
    }
}

/// Shown instead of the sphere when rendering never came up.
pub const FALLBACK_MESSAGE: &str = "The gallery cannot be displayed on this device.";

#[derive(Component)]
pub struct FallbackText;

/// Outcome of one render capability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderCheck {
    Ready(PlatformLimits),
    Waiting,
    TimedOut,
}

pub fn check_render_device(limits: Option<PlatformLimits>, elapsed: f32) -> RenderCheck {
    match limits {
        Some(limits) => RenderCheck::Ready(limits),
        None if elapsed >= RENDER_INIT_TIMEOUT_SECONDS => RenderCheck::TimedOut,
        None => RenderCheck::Waiting,
    }
}

// Waits for the render device, then applies its texture limits before any atlas is bound
pub fn check_render_capability(
    render_device: Option<Res<RenderDevice>>,
    time: Res<Time>,
    mut manager: ResMut<AtlasManager>,
    mut progress: ResMut<LoadingProgress>,
    mut errors: EventWriter<GalleryErrorRaised>,
    mut next_state: ResMut<NextState<GalleryState>>,
) {
    let limits = render_device.map(|device| {
        let limits = device.limits();
        PlatformLimits {
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_sampled_textures: limits.max_sampled_textures_per_shader_stage,
        }
    });

    match check_render_device(limits, time.elapsed_secs()) {
        RenderCheck::Ready(limits) => {
            manager.set_limits(limits);
            progress.render_ready = true;
            info!(
                "render device ready: {} px textures, {} sheets",
                limits.max_texture_dimension,
                manager.grid().max_sheets
            );
            info!("→ Transitioning to Running state");
            next_state.set(GalleryState::Running);
        }
        RenderCheck::TimedOut => {
            error!("no render device after {RENDER_INIT_TIMEOUT_SECONDS} s");
            errors.write(GalleryErrorRaised(GalleryError::RenderingUnavailable(
                "no render device after the initialisation window".to_string(),
            )));
            info!("→ Transitioning to Failed state");
            next_state.set(GalleryState::Failed);
        }
        RenderCheck::Waiting => {}
    }
}

pub fn show_fallback_message(mut commands: Commands) {
    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            justify_content: JustifyContent::Center,
            align_items: AlignItems::Center,
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                Text::new(FALLBACK_MESSAGE),
                TextFont {
                    font_size: 20.0,
                    ..default()
                },
                TextColor(Color::srgb(0.85, 0.85, 0.85)),
                FallbackText,
            ));
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_limits_are_used_as_soon_as_they_exist() {
        let limits = PlatformLimits {
            max_texture_dimension: 8192,
            max_sampled_textures: 16,
        };
        assert_eq!(check_render_device(Some(limits), 0.0), RenderCheck::Ready(limits));
        assert_eq!(check_render_device(Some(limits), 60.0), RenderCheck::Ready(limits));
    }

    #[test]
    fn missing_device_fails_only_after_the_window() {
        assert_eq!(check_render_device(None, 0.5), RenderCheck::Waiting);
        assert_eq!(
            check_render_device(None, RENDER_INIT_TIMEOUT_SECONDS),
            RenderCheck::TimedOut
        );
    }

    #[test]
    fn states_have_host_names() {
        assert_eq!(GalleryState::default().as_str(), "loading");
        assert_eq!(GalleryState::Failed.as_str(), "failed");
    }
}
