//! Inkboard Core Library
//!
//! Platform-agnostic scene model, drawing tools, undo history and the
//! persistence and live-update plumbing for the Inkboard design canvas.

pub mod camera;
pub mod canvas;
pub mod collaboration;
pub mod debounce;
pub mod factory;
pub mod history;
pub mod realtime;
pub mod serializer;
pub mod session;
pub mod settings;
pub mod shapes;
pub mod shortcuts;
pub mod snap;
pub mod storage;
pub mod sync;
pub mod tools;

#[cfg(test)]
mod testing;

pub use camera::Camera;
pub use canvas::{Canvas, CanvasDocument, CanvasEvent, CanvasSnapshot, PointerOutcome};
pub use collaboration::{CollaborationError, CollaborationManager};
pub use factory::ShapeFactory;
pub use history::{History, HistoryConfig};
pub use realtime::{ChangeFeed, ChangeKind, ChangeNotification, Reconciler, Subscription};
pub use serializer::{BoardObjectRecord, ObjectPatch, ObjectType, SerializeError};
pub use session::{BoardSession, SessionConfig};
pub use settings::{BoardSettings, SettingsStore};
pub use shapes::{Shape, ShapeId, ShapeStyle, StylePatch};
pub use shortcuts::KeyCommand;
pub use snap::{snap_point, snap_to_grid};
pub use storage::{BoardStore, MemoryStore, Role, StorageError};
pub use sync::{Notification, PersistenceSync, SyncConfig};
pub use tools::{ToolKind, ToolManager};
