pub mod forms;
pub mod login_page;
pub mod navigation;
pub mod register_page;
