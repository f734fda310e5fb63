//! JSON-RPC 2.0 bridge between the gallery and its host page.
//!
//! On WASM the engine runs inside an iframe and talks to the parent window
//! through `postMessage`. Native builds keep the same plumbing with a no-op
//! transport, so request handling is exercised everywhere.
//!
//! ## Message Flow
//!
//! ```text
//! Host page (parent)  <──postMessage──>  Gallery (iframe)
//!        │                                     │
//!        ├─ set_items { items } ─────────────> ├─ SetGalleryItems
//!        ├─ get_active_item / get_state ─────> │
//!        │ <──────────────────── Response ─────┤
//!        │ <── item_settled / motion_changed ──┤
//!        │ <── error / loading_progress ───────┤
//! ```
//!
//! ## Methods
//!
//! - `set_items`: replace the item array; params `{ "items": [Item, ...] }`.
//!   Accepted as a notification too, in which case no response is sent.
//! - `get_active_item`: `{ index, item }` of the item facing the camera, or `null`.
//! - `get_state`: `{ state, item_count, generation, is_moving }`.
//!
//! ## Notifications
//!
//! - `item_settled`: `{ index, item }`, once per settle.
//! - `motion_changed`: `{ is_moving }`, on every change.
//! - `error`: `{ code, message, fatal }`.
//! - `loading_progress`: atlas thumbnails loaded for the newest generation.
//!
//! ## Error Handling
//!
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//!
//! Messages that are not valid JSON-RPC are logged and dropped.

/// Request dispatch, notification forwarding and the `postMessage` transport.
pub mod web_rpc;
