pub mod content_type;
pub mod path;
pub mod route_matcher;
