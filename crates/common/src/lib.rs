// griddoc-common: data model, cell index, view engine and save-status
// machine shared by the store, editor and CLI crates.

pub mod index;
pub mod model;
pub mod permissions;
pub mod record;
pub mod status;
pub mod validation;
pub mod view;

pub use index::{CellIndex, CellKey};
pub use model::{
    AttachmentTarget, CellData, CellValue, Column, DataType, Document, FileAttachment,
    MultilineData, Row, SubColumn,
};
pub use permissions::{Action, Audience, Permissions, Viewer};
pub use record::{CellRecord, DecodeError, MultilineRecord, ValueSlots};
pub use status::{SaveStatus, SaveTracker};
pub use validation::ValidationError;
pub use view::{apply_view, ColumnFilter, FilterOp, SortDirection, SortDirective, ViewQuery};
