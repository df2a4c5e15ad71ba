pub mod bulk;
pub mod health;
pub mod nodes;
pub mod scroll;

pub use bulk::{run_bulk, DocumentSource};
pub use health::run_health;
pub use nodes::run_nodes;
pub use scroll::run_scroll;
