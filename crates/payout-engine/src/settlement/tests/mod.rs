mod advances;
mod common;
