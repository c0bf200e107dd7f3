//! Repository traits for metadata operations.

pub mod datasets;
pub mod folders;
pub mod images;
pub mod jobs;
pub mod models;
pub mod users;

pub use datasets::DatasetRepo;
pub use folders::FolderRepo;
pub use images::ImageRepo;
pub use jobs::PollJobRepo;
pub use models::ModelRepo;
pub use users::UserRepo;
