// griddoc-editor: editing sessions, debounced autosave and structural
// operations over a griddoc store.

pub mod admin;
pub mod autosave;
pub mod config;
pub mod editor;
pub mod error;
pub mod flush;
pub mod session;

pub use config::EditorConfig;
pub use editor::Editor;
pub use error::EditorError;
pub use flush::{FlushMode, FlushOutcome, Notice};
pub use session::EditorSession;
