pub mod atomic;
pub mod config;
pub mod contributions;
pub mod error;
pub mod export;
pub mod layout;
pub mod mesh;
pub mod scad;
pub mod stats;

pub use config::Config;
pub use contributions::Contributions;
pub use error::{Result, SkylineError};
pub use export::export_buckets_csv;
pub use layout::{
    AspectRatio, BaseParams, BoundingBox, Building, Grid, Labels, Skyline, SkylineGenerator,
    SkylineParams, grid_size,
};
pub use mesh::{MeshReport, materialize};
pub use scad::{EmitOptions, emit, write_scad};
pub use stats::{Bucket, Granularity, aggregate, max_count};
