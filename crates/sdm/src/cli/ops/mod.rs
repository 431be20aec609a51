pub mod clean;
pub mod list;
pub mod mount;
pub mod status;
pub mod unmount;

pub use clean::Clean;
pub use list::List;
pub use mount::Mount;
pub use status::Status;
pub use unmount::Unmount;
