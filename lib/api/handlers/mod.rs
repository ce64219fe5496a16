pub mod images;
pub mod predictions;
