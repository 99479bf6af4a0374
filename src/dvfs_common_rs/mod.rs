pub mod edit;
pub mod editor;
pub mod export;
pub mod register;
pub mod table;
pub mod utils;
