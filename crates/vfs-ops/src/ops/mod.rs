//! Concrete operations built on top of [`crate::Operation`].

mod batch;
mod copy_file;
mod copy_tree;
mod create_directory;
mod delete;
mod delete_tree;
mod move_op;
mod transfer_tree;

pub use batch::Batch;
pub use copy_file::CopyFile;
pub use copy_tree::CopyTree;
pub use create_directory::CreateDirectory;
pub use delete::Delete;
pub use delete_tree::DeleteTree;
pub use move_op::Move;
pub use transfer_tree::TransferTree;
