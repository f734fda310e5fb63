use crate::engine::assets::gallery_items::{GalleryItems, Item};
use crate::engine::core::app_state::GalleryState;
use crate::engine::events::{ActiveItemSettled, GalleryErrorRaised, MotionChanged, SetGalleryItems};
use crate::engine::layout::sphere_layout::SphereState;
use crate::engine::loading::progress::LoadingProgress;
use crate::engine::orbit::orbit_controller::OrbitController;
use crate::error::GalleryError;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
use web_sys::{MessageEvent, window};

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
            data: Some(json!({ "method": method })),
        }
    }

    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.to_string(),
            data: None,
        }
    }
}

/// Queued traffic towards the host page.
#[derive(Resource, Default)]
pub struct WebRpcInterface {
    outgoing_notifications: Vec<RpcNotification>,
    outgoing_responses: Vec<RpcResponse>,
}

impl WebRpcInterface {
    /// Send notification to the host without expecting a response.
    pub fn send_notification(&mut self, method: &str, params: Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    fn queue_response(&mut self, response: RpcResponse) {
        self.outgoing_responses.push(response);
    }
}

/// Read-only view of the gallery that requests are answered from.
#[derive(Debug, Clone)]
pub struct GalleryView<'a> {
    pub state: GalleryState,
    pub items: &'a GalleryItems,
    pub active: Option<(usize, &'a Item)>,
    pub is_moving: bool,
}

/// What one request asks the engine to do, plus the reply if it wants one.
#[derive(Debug, Default)]
pub struct HandledRequest {
    pub response: Option<RpcResponse>,
    pub item_update: Option<Vec<Item>>,
}

/// Plugin bridging the gallery to a host page over `postMessage`.
pub struct WebRpcPlugin;

impl Plugin for WebRpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WebRpcInterface>()
            .add_event::<IncomingRpcMessage>()
            .add_systems(
                Update,
                (
                    process_incoming_messages,
                    handle_rpc_messages,
                    notify_gallery_events,
                    notify_loading_progress,
                    send_outgoing_messages,
                )
                    .chain(),
            );

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, setup_message_listener);
    }
}

#[cfg(target_arch = "wasm32")]
fn setup_message_listener(mut commands: Commands) {
    use std::sync::Arc;
    use std::sync::Mutex;

    let message_queue: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let queue_clone = message_queue.clone();

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        if let Ok(data) = event.data().dyn_into::<js_sys::JsString>() {
            let message_str: String = data.into();
            if message_str.contains("jsonrpc") {
                if let Ok(mut queue) = queue_clone.lock() {
                    queue.push(message_str);
                }
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    match window() {
        Some(window) => {
            if let Err(err) =
                window.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            {
                error!("failed to register message listener: {:?}", err);
            }
        }
        None => warn!("no window, host messages will not be received"),
    }

    // Ownership moves to JS so the listener outlives this system.
    closure.forget();
    commands.insert_resource(MessageQueue(message_queue));
}

#[derive(Resource)]
struct MessageQueue(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

#[derive(Event)]
struct IncomingRpcMessage {
    content: String,
}

fn process_incoming_messages(
    message_queue: Option<Res<MessageQueue>>,
    mut message_events: EventWriter<IncomingRpcMessage>,
) {
    let Some(queue_res) = message_queue else {
        return;
    };

    let messages = if let Ok(mut queue) = queue_res.0.lock() {
        std::mem::take(&mut *queue)
    } else {
        Vec::new()
    };

    for message_str in messages {
        message_events.write(IncomingRpcMessage {
            content: message_str,
        });
    }
}

fn handle_rpc_messages(
    mut events: EventReader<IncomingRpcMessage>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    mut updates: EventWriter<SetGalleryItems>,
    state: Res<State<GalleryState>>,
    items: Res<GalleryItems>,
    sphere: Res<SphereState>,
    orbit: Res<OrbitController>,
) {
    let view = GalleryView {
        state: *state.get(),
        items: &items,
        active: sphere
            .active_slot(orbit.orientation())
            .and_then(|slot| items.item_for_slot(slot)),
        is_moving: orbit.is_moving(),
    };

    for event in events.read() {
        let request = match serde_json::from_str::<RpcRequest>(&event.content) {
            Ok(request) => request,
            Err(parse_error) => {
                warn!("dropping malformed RPC message: {parse_error}");
                continue;
            }
        };
        debug!("RPC {}", request.method);

        let handled = handle_rpc_request(&request, &view);
        if let Some(next) = handled.item_update {
            updates.write(SetGalleryItems(next));
        }
        if let Some(response) = handled.response {
            rpc_interface.queue_response(response);
        }
    }
}

/// Dispatches one request. Notifications (no id) are still executed but get no reply.
pub fn handle_rpc_request(request: &RpcRequest, view: &GalleryView) -> HandledRequest {
    let mut handled = HandledRequest::default();

    let result = match request.method.as_str() {
        "set_items" => handle_set_items(&request.params).map(|next| {
            let count = next.len();
            handled.item_update = Some(next);
            json!({ "success": true, "count": count })
        }),
        "get_active_item" => Ok(handle_get_active_item(view)),
        "get_state" => Ok(handle_get_state(view)),
        _ => {
            warn!("Unknown RPC method: {}", request.method);
            Err(RpcError::method_not_found(&request.method))
        }
    };

    handled.response = request.id.clone().map(|id| match result {
        Ok(result_value) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(result_value),
            error: None,
            id: Some(id),
        },
        Err(error) => RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        },
    });
    handled
}

fn handle_set_items(params: &Value) -> Result<Vec<Item>, RpcError> {
    #[derive(Deserialize)]
    struct SetItemsParams {
        items: Vec<Item>,
    }

    serde_json::from_value::<SetItemsParams>(params.clone())
        .map(|parsed| parsed.items)
        .map_err(|err| RpcError::invalid_params(&format!("Expected 'items' array: {err}")))
}

fn handle_get_active_item(view: &GalleryView) -> Value {
    match view.active {
        Some((index, item)) => json!({ "index": index, "item": item }),
        None => Value::Null,
    }
}

fn handle_get_state(view: &GalleryView) -> Value {
    json!({
        "state": view.state.as_str(),
        "item_count": view.items.len(),
        "generation": view.items.generation(),
        "is_moving": view.is_moving,
    })
}

pub fn error_params(error: &GalleryError) -> Value {
    json!({
        "code": error.code(),
        "message": error.to_string(),
        "fatal": error.is_fatal(),
    })
}

fn notify_gallery_events(
    mut settled: EventReader<ActiveItemSettled>,
    mut motion: EventReader<MotionChanged>,
    mut errors: EventReader<GalleryErrorRaised>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    for event in settled.read() {
        rpc_interface.send_notification("item_settled", json!({ "index": event.index, "item": event.item }));
    }
    for event in motion.read() {
        rpc_interface.send_notification("motion_changed", json!({ "is_moving": event.is_moving }));
    }
    for GalleryErrorRaised(error) in errors.read() {
        rpc_interface.send_notification("error", error_params(error));
    }
}

/// Reports atlas progress whenever the loaded count moves.
fn notify_loading_progress(
    progress: Res<LoadingProgress>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    mut last_sent: Local<Option<(u64, usize)>>,
) {
    let Some(atlas) = &progress.atlas else {
        return;
    };
    let current = (atlas.generation, atlas.loaded());
    if *last_sent == Some(current) {
        return;
    }
    *last_sent = Some(current);

    rpc_interface.send_notification(
        "loading_progress",
        json!({
            "generation": atlas.generation,
            "loaded": current.1,
            "total": atlas.total,
            "fraction": atlas.fraction(),
            "complete": atlas.is_complete(),
            "items_loaded": progress.items_loaded,
            "render_ready": progress.render_ready,
        }),
    );
}

fn send_outgoing_messages(mut rpc_interface: ResMut<WebRpcInterface>) {
    for notification in rpc_interface.outgoing_notifications.drain(..) {
        send_message_to_parent(&notification);
    }
    for response in rpc_interface.outgoing_responses.drain(..) {
        send_message_to_parent(&response);
    }
}

/// Posts a serialized message to the parent window.
fn send_message_to_parent<T: Serialize>(message: &T) {
    #[cfg(target_arch = "wasm32")]
    {
        match serde_json::to_string(message) {
            Ok(json) => {
                if let Some(window) = window() {
                    if let Some(parent) = window.parent().ok().flatten() {
                        if let Err(e) = parent.post_message(&JsValue::from_str(&json), "*") {
                            error!("Failed to send message to parent: {:?}", e);
                        }
                    } else {
                        warn!("No parent window available for message transmission");
                    }
                } else {
                    error!("Window object not available");
                }
            }
            Err(e) => {
                error!("Failed to serialize message: {}", e);
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::gallery_items::fixtures::items;

    fn request(method: &str, params: Value, id: Option<i64>) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: id.map(Value::from),
        }
    }

    fn view(gallery: &GalleryItems) -> GalleryView<'_> {
        GalleryView {
            state: GalleryState::Running,
            items: gallery,
            active: gallery.item_for_slot(0),
            is_moving: false,
        }
    }

    #[test]
    fn unknown_methods_are_rejected() {
        let gallery = GalleryItems::default();
        let handled = handle_rpc_request(&request("spin", Value::Null, Some(1)), &view(&gallery));
        let error = handled.response.and_then(|r| r.error).unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
    }

    #[test]
    fn set_items_without_an_array_is_invalid() {
        let gallery = GalleryItems::default();
        let handled = handle_rpc_request(&request("set_items", json!({ "items": 3 }), Some(2)), &view(&gallery));
        assert!(handled.item_update.is_none());
        assert_eq!(handled.response.and_then(|r| r.error).map(|e| e.code), Some(INVALID_PARAMS));
    }

    #[test]
    fn set_items_publishes_the_new_array() {
        let gallery = GalleryItems::default();
        let params = json!({ "items": [
            { "id": 1, "thumbnailURL": "t/1.jpg" },
            { "id": 1, "thumbnailURL": "t/1.jpg" },
            { "id": 9, "thumbnailURL": "t/9.jpg", "title": "Nine" }
        ] });
        let handled = handle_rpc_request(&request("set_items", params, Some(3)), &view(&gallery));

        assert_eq!(handled.item_update.map(|next| next.len()), Some(3));
        let response = handled.response.unwrap();
        assert_eq!(response.id, Some(json!(3)));
        assert_eq!(response.result, Some(json!({ "success": true, "count": 3 })));
    }

    #[test]
    fn notifications_run_without_a_reply() {
        let gallery = GalleryItems::default();
        let handled = handle_rpc_request(&request("set_items", json!({ "items": [] }), None), &view(&gallery));
        assert!(handled.response.is_none());
        assert_eq!(handled.item_update, Some(Vec::new()));
    }

    #[test]
    fn queries_answer_from_the_current_view() {
        let mut gallery = GalleryItems::default();
        gallery.replace(items(5));

        let active = handle_rpc_request(&request("get_active_item", Value::Null, Some(4)), &view(&gallery));
        let result = active.response.and_then(|r| r.result).unwrap();
        assert_eq!(result["index"], json!(0));
        assert_eq!(result["item"]["id"], json!(0));

        let state = handle_rpc_request(&request("get_state", Value::Null, Some(5)), &view(&gallery));
        let result = state.response.and_then(|r| r.result).unwrap();
        assert_eq!(result["state"], json!("running"));
        assert_eq!(result["item_count"], json!(5));
    }

    #[test]
    fn empty_gallery_has_no_active_item() {
        let gallery = GalleryItems::default();
        let handled = handle_rpc_request(&request("get_active_item", Value::Null, Some(6)), &view(&gallery));
        assert_eq!(handled.response.and_then(|r| r.result), Some(Value::Null));
    }

    #[test]
    fn error_notifications_carry_a_stable_code() {
        let params = error_params(&GalleryError::RenderingUnavailable("no adapter".to_string()));
        assert_eq!(params["code"], json!("rendering_unavailable"));
        assert_eq!(params["fatal"], json!(true));
    }

    #[test]
    fn requests_without_params_parse() {
        let parsed: RpcRequest = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"get_state","id":7}"#).unwrap();
        assert_eq!(parsed.params, Value::Null);
    }
}
