//! Density-aware sampling of map tiles.
//!
//! A tile in a dense area can match far more features than a client can
//! render. Rather than truncating every tile to the same size, which makes
//! tile borders visible, the sampler scales each tile's sample by the density
//! of its densest neighbor:
//!
//! 1. Count the tile. An empty tile short-circuits.
//! 2. A sparse tile (at most `N / low_density_divisor` features) is served
//!    whole.
//! 3. Otherwise count the eight neighbors concurrently and take
//!    `max_count = max(main, neighbors)`.
//! 4. `sample_rate = N / max(N, max_count)` and
//!    `query_size = min(ceil(main_count * sample_rate), N)`.
//! 5. If the estimated payload (`mean row size * max_count`) exceeds
//!    `max_tile_bytes`, the heavy geometry field is dropped and features
//!    degrade to points.
//!
//! A failed neighbor count fails the whole tile.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use crate::config::SamplingConfig;
use crate::error::{EngineResult, SamplingError};
use crate::tiles::TileCoord;

/// Default divisor of the low-density threshold.
pub const LOW_DENSITY_DIVISOR: u64 = 20;

/// Default ceiling of the estimated tile payload, in bytes.
pub const MAX_TILE_BYTES: u64 = 50_000_000;

/// Counts the documents of a dataset inside a tile.
#[async_trait]
pub trait TileCounter: Send + Sync {
    /// Returns the number of matching documents inside `tile`.
    async fn count(&self, tile: TileCoord) -> EngineResult<u64>;
}

/// Result of sampling a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The tile holds no feature, the caller answers with no content.
    Empty,
    /// Query the tile with these overrides.
    Sample(TileSampling),
}

/// Overrides applied to a tile query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSampling {
    /// Number of features to request.
    pub query_size: u64,
    /// Drop the geometry shape from the projection.
    pub drop_geometry: bool,
    /// Feature count of the tile.
    pub main_count: u64,
    /// Highest feature count among the tile and its neighbors.
    pub max_count: u64,
}

/// Computes sample sizes for map tiles.
#[derive(Debug, Clone)]
pub struct AdaptiveTileSampler {
    config: SamplingConfig,
}

impl Default for AdaptiveTileSampler {
    fn default() -> Self {
        Self::new(SamplingConfig::default())
    }
}

impl AdaptiveTileSampler {
    /// Creates a sampler with the given thresholds.
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    /// Returns the sampler configuration.
    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Samples a tile.
    ///
    /// `mean_row_size` is the estimated indexed size of one feature, when
    /// known; without it the geometry is never dropped.
    pub async fn sample<C>(
        &self,
        tile: TileCoord,
        requested: u64,
        mean_row_size: Option<u64>,
        counter: &C,
    ) -> EngineResult<SamplingDecision>
    where
        C: TileCounter + ?Sized,
    {
        let main_count = counter.count(tile).await?;
        if main_count == 0 {
            return Ok(SamplingDecision::Empty);
        }

        let divisor = self.config.low_density_divisor.max(1);
        if main_count <= requested / divisor {
            debug!(tile = %tile, main_count, "low density tile, no sampling");
            return Ok(SamplingDecision::Sample(TileSampling {
                query_size: requested,
                drop_geometry: false,
                main_count,
                max_count: main_count,
            }));
        }

        let neighbors = tile.neighbors();
        let counts: Vec<u64> = stream::iter(neighbors)
            .map(|neighbor| async move {
                counter
                    .count(neighbor)
                    .await
                    .map_err(|e| SamplingError::NeighborCount {
                        tile: neighbor,
                        source: Box::new(e),
                    })
            })
            .buffer_unordered(self.config.neighbor_concurrency.max(1))
            .try_collect()
            .await?;

        let max_count = counts.into_iter().fold(main_count, u64::max);
        let query_size = sampled_query_size(requested, main_count, max_count);
        let drop_geometry = mean_row_size
            .is_some_and(|size| size.saturating_mul(max_count) > self.config.max_tile_bytes);

        debug!(
            tile = %tile,
            main_count,
            max_count,
            query_size,
            drop_geometry,
            "sampled dense tile"
        );

        Ok(SamplingDecision::Sample(TileSampling {
            query_size,
            drop_geometry,
            main_count,
            max_count,
        }))
    }
}

/// Scales the requested size of a tile by the density of its neighborhood.
///
/// The result never exceeds `requested` and never grows when `max_count`
/// grows.
pub fn sampled_query_size(requested: u64, main_count: u64, max_count: u64) -> u64 {
    if requested == 0 {
        return 0;
    }
    // ceil(main_count * sample_rate), in integers to stay exact
    let denominator = u128::from(requested.max(max_count));
    let scaled = u128::from(main_count) * u128::from(requested);
    let size = scaled.div_ceil(denominator);
    u64::try_from(size).unwrap_or(u64::MAX).min(requested)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{BackendError, EngineError};

    struct FixedCounter {
        main: TileCoord,
        main_count: u64,
        neighbor_count: u64,
        overrides: HashMap<TileCoord, u64>,
        failing: Option<TileCoord>,
        calls: AtomicUsize,
    }

    impl FixedCounter {
        fn new(main: TileCoord, main_count: u64, neighbor_count: u64) -> Self {
            Self {
                main,
                main_count,
                neighbor_count,
                overrides: HashMap::new(),
                failing: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TileCounter for FixedCounter {
        async fn count(&self, tile: TileCoord) -> EngineResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(tile) == self.failing {
                return Err(EngineError::Backend(BackendError::QueryError {
                    message: "search engine timeout".to_string(),
                }));
            }
            if tile == self.main {
                return Ok(self.main_count);
            }
            Ok(*self.overrides.get(&tile).unwrap_or(&self.neighbor_count))
        }
    }

    fn tile() -> TileCoord {
        TileCoord::new(8, 8, 5).unwrap()
    }

    #[tokio::test]
    async fn test_empty_tile() {
        let counter = FixedCounter::new(tile(), 0, 1000);
        let decision = AdaptiveTileSampler::default()
            .sample(tile(), 100, None, &counter)
            .await
            .unwrap();
        assert_eq!(decision, SamplingDecision::Empty);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_low_density_tile_is_not_sampled() {
        let counter = FixedCounter::new(tile(), 5, 1_000_000);
        let decision = AdaptiveTileSampler::default()
            .sample(tile(), 100, None, &counter)
            .await
            .unwrap();
        let SamplingDecision::Sample(sampling) = decision else {
            panic!("expected a sample");
        };
        assert_eq!(sampling.query_size, 100);
        assert!(!sampling.drop_geometry);
        // neighbors are never counted
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dense_tile_is_scaled_by_densest_neighbor() {
        let mut counter = FixedCounter::new(tile(), 500, 100);
        counter
            .overrides
            .insert(TileCoord::new(9, 9, 5).unwrap(), 2000);
        let decision = AdaptiveTileSampler::default()
            .sample(tile(), 100, None, &counter)
            .await
            .unwrap();
        let SamplingDecision::Sample(sampling) = decision else {
            panic!("expected a sample");
        };
        assert_eq!(sampling.max_count, 2000);
        // 500 * 100 / 2000
        assert_eq!(sampling.query_size, 25);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_failed_neighbor_fails_the_tile() {
        let mut counter = FixedCounter::new(tile(), 500, 100);
        let failing = TileCoord::new(7, 7, 5).unwrap();
        counter.failing = Some(failing);
        let err = AdaptiveTileSampler::default()
            .sample(tile(), 100, None, &counter)
            .await
            .unwrap_err();
        match err {
            EngineError::Sampling(SamplingError::NeighborCount { tile, .. }) => {
                assert_eq!(tile, failing)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_heavy_tiles_drop_geometry() {
        let counter = FixedCounter::new(tile(), 50_000, 60_000);
        let sampler = AdaptiveTileSampler::default();

        let decision = sampler.sample(tile(), 10_000, Some(1_000), &counter).await.unwrap();
        let SamplingDecision::Sample(sampling) = decision else {
            panic!("expected a sample");
        };
        // 1000 bytes * 60000 features = 60 MB
        assert!(sampling.drop_geometry);

        let decision = sampler.sample(tile(), 10_000, Some(100), &counter).await.unwrap();
        let SamplingDecision::Sample(sampling) = decision else {
            panic!("expected a sample");
        };
        assert!(!sampling.drop_geometry);
    }

    #[tokio::test]
    async fn test_thresholds_are_configurable() {
        let counter = FixedCounter::new(tile(), 30, 3000);
        let sampler = AdaptiveTileSampler::new(SamplingConfig {
            low_density_divisor: 2,
            ..SamplingConfig::default()
        });
        let SamplingDecision::Sample(sampling) =
            sampler.sample(tile(), 100, None, &counter).await.unwrap()
        else {
            panic!("expected a sample");
        };
        assert_eq!(sampling.query_size, 100);
    }

    #[test]
    fn test_sampled_query_size_scenarios() {
        assert_eq!(sampled_query_size(100, 5, 5), 5);
        assert_eq!(sampled_query_size(100, 80, 90), 80);
        assert_eq!(sampled_query_size(100, 1000, 1000), 100);
        assert_eq!(sampled_query_size(100, 1000, 4000), 25);
        assert_eq!(sampled_query_size(0, 10, 10), 0);
    }

    #[test]
    fn test_sampled_query_size_is_monotonic() {
        let requested = 1000;
        for main in [1u64, 37, 999, 1000, 25_000] {
            let mut previous = u64::MAX;
            for max in (main..main * 20 + 2000).step_by(97) {
                let size = sampled_query_size(requested, main, max);
                assert!(size <= requested);
                assert!(size <= previous, "main={main} max={max}");
                previous = size;
            }
        }
    }
}
