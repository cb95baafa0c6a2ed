//! Configuration helpers shared by the CLI.

pub mod duration;
pub mod mapping;

pub use duration::{duration_arg, parse_duration};
pub use mapping::{
    build_router, load_mapping_file, parse_topic_map, topic_map_arg, DEFAULT_TOPIC_MAPPING,
};
