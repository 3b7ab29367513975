pub mod api_router;
pub mod canvas;
pub mod directory;
pub mod shared;
pub mod tests;
