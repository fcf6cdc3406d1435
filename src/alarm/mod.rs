pub mod controller;
pub mod model;
pub mod resolver;
pub mod timer;
