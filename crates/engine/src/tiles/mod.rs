//! Map tiles: coordinates, adaptive sampling and vector tile encoding.

pub mod coords;
pub mod mvt;
pub mod sampler;

pub use coords::TileCoord;
pub use sampler::{
    AdaptiveTileSampler, LOW_DENSITY_DIVISOR, MAX_TILE_BYTES, SamplingDecision, TileCounter,
    TileSampling, sampled_query_size,
};
