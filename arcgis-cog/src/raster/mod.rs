pub mod cog;
pub mod tools;
pub mod vrt;

pub use cog::{create_cog, CogBuilder, CogOptions};
pub use tools::{GdalCli, ToolInvocation, ToolRunner};
pub use vrt::create_vrt_from_tiles;
