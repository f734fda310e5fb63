//! Start-up loading of the item collection and build progress tracking.

/// Initial item collection loading through the asset server.
///
/// The loaded collection is published through the same event the host uses.
pub mod items_loader;

/// Loading progress shared between the tick and background atlas builds.
pub mod progress;
