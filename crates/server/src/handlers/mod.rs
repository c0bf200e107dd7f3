//! API request handlers.

pub mod auth;
pub mod folders;
pub mod images;
pub mod search;
pub mod training;

pub use auth::{health_check, login, register, whoami};
pub use folders::{
    create_folder, delete_folder, get_folder, list_folder_images, list_folders, update_folder,
};
pub use images::{
    delete_image, get_image, get_image_content, get_image_url, list_images, move_image,
    upload_images,
};
pub use search::search_images;
pub use training::{
    delete_dataset, delete_model, deploy_model, get_dataset, get_model, list_datasets,
    list_deployed_models, list_models, train_model, undeploy_model, upload_dataset,
};
