//! Subcommand handlers. Each one returns the JSON document to print.

use std::collections::HashMap;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, info};

use tessera_engine::schema::{
    BreakingChangeOptions, Vocabulary, breaking_changes_with, extended_schema, index_mapping,
};
use tessera_engine::tiles::{AdaptiveTileSampler, SamplingDecision, TileCoord, TileCounter};
use tessera_engine::types::{Dataset, DatasetPatch, Field};
use tessera_engine::{EngineConfig, EngineResult, PatchPlanner, PlanContext};

use crate::config::{Command, read_json};

/// Runs one subcommand.
pub async fn run(command: &Command, config: &EngineConfig) -> anyhow::Result<Value> {
    match command {
        Command::Plan {
            dataset,
            patch,
            draft,
            forbid_breaking_changes,
            now,
        } => {
            let dataset: Dataset = read_json(dataset)?;
            let patch: DatasetPatch = read_json(patch)?;
            let now = parse_now(now.as_deref())?;
            plan(&dataset, &patch, now, *draft, *forbid_breaking_changes)
        }
        Command::BreakingChanges {
            old,
            new,
            strict,
            ignore_extensions,
        } => {
            let old: Vec<Field> = read_json(old)?;
            let new: Vec<Field> = read_json(new)?;
            let options = BreakingChangeOptions {
                strict: *strict,
                ignore_extensions: *ignore_extensions,
            };
            Ok(serde_json::to_value(breaking_changes_with(&old, &new, options))?)
        }
        Command::ExtendedSchema { dataset } => {
            let dataset: Dataset = read_json(dataset)?;
            Ok(serde_json::to_value(extended_schema(
                &dataset,
                Vocabulary::standard(),
                None,
            ))?)
        }
        Command::Mapping { dataset } => {
            let dataset: Dataset = read_json(dataset)?;
            let schema = extended_schema(&dataset, Vocabulary::standard(), None);
            Ok(index_mapping(&schema))
        }
        Command::Sample {
            tile,
            size,
            counts,
            mean_row_size,
        } => {
            let tile = TileCoord::parse(tile)?;
            let size = size.unwrap_or(config.sampling.default_tile_size);
            sample(config, tile, size, counts, *mean_row_size).await
        }
        Command::TileBbox { tile } => {
            let tile = TileCoord::parse(tile)?;
            Ok(json!({
                "tile": tile.to_string(),
                "bbox": tile.bbox(),
            }))
        }
    }
}

fn parse_now(now: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match now {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --now timestamp: {}", raw))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn plan(
    dataset: &Dataset,
    patch: &DatasetPatch,
    now: DateTime<Utc>,
    draft: bool,
    forbid_breaking_changes: bool,
) -> anyhow::Result<Value> {
    let mut ctx = PlanContext::new(now);
    if draft {
        ctx = ctx.in_draft();
    }
    if forbid_breaking_changes {
        ctx = ctx.forbidding_breaking_changes();
    }
    let plan = PatchPlanner::new().plan(dataset, patch, &ctx)?;
    info!(
        dataset_id = %dataset.id,
        status = %plan.status,
        noop = plan.noop,
        "Planned patch"
    );
    Ok(serde_json::to_value(&plan)?)
}

async fn sample(
    config: &EngineConfig,
    tile: TileCoord,
    size: u64,
    counts: &[u64],
    mean_row_size: Option<u64>,
) -> anyhow::Result<Value> {
    let counter = KnownCounts::new(tile, counts)?;
    let sampler = AdaptiveTileSampler::new(config.sampling.clone());
    let decision = sampler.sample(tile, size, mean_row_size, &counter).await?;
    Ok(match decision {
        SamplingDecision::Empty => json!({ "tile": tile.to_string(), "empty": true }),
        SamplingDecision::Sample(sampling) => json!({
            "tile": tile.to_string(),
            "empty": false,
            "querySize": sampling.query_size,
            "dropGeometry": sampling.drop_geometry,
            "mainCount": sampling.main_count,
            "maxCount": sampling.max_count,
        }),
    })
}

/// Tile counts given on the command line: the tile first, then its
/// neighbors in [`TileCoord::neighbors`] order. Unlisted tiles are empty.
#[derive(Debug)]
struct KnownCounts {
    counts: HashMap<TileCoord, u64>,
}

impl KnownCounts {
    fn new(tile: TileCoord, counts: &[u64]) -> anyhow::Result<Self> {
        let tiles: Vec<TileCoord> = std::iter::once(tile).chain(tile.neighbors()).collect();
        if counts.len() > tiles.len() {
            bail!(
                "Tile {} has {} neighbors, got {} counts",
                tile,
                tiles.len() - 1,
                counts.len()
            );
        }
        Ok(Self {
            counts: tiles.into_iter().zip(counts.iter().copied()).collect(),
        })
    }
}

#[async_trait]
impl TileCounter for KnownCounts {
    async fn count(&self, tile: TileCoord) -> EngineResult<u64> {
        let count = self.counts.get(&tile).copied().unwrap_or(0);
        debug!(tile = %tile, count, "Known tile count");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_engine::types::{DatasetStatus, FieldType};

    fn finalized() -> Dataset {
        let mut dataset = Dataset::new("stations");
        dataset.status = DatasetStatus::Finalized;
        dataset.schema = vec![Field::new("name", FieldType::String)];
        dataset
    }

    #[test]
    fn test_plan_output() {
        let patch = DatasetPatch {
            schema: Some(vec![Field::new("name", FieldType::Integer)]),
            ..Default::default()
        };
        let value = plan(&finalized(), &patch, Utc::now(), false, false).unwrap();
        assert_eq!(value["status"], json!("analyzed"));
        assert_eq!(value["noop"], json!(false));
    }

    #[test]
    fn test_plan_forbidding_breaking_changes() {
        let patch = DatasetPatch {
            schema: Some(vec![Field::new("name", FieldType::Integer)]),
            ..Default::default()
        };
        assert!(plan(&finalized(), &patch, Utc::now(), false, true).is_err());
    }

    #[test]
    fn test_parse_now() {
        let now = parse_now(Some("2024-05-01T10:00:00+02:00")).unwrap();
        assert_eq!(now.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert!(parse_now(Some("yesterday")).is_err());
    }

    #[tokio::test]
    async fn test_sample_low_density() {
        let tile = TileCoord::parse("10/525/365").unwrap();
        let value = sample(&EngineConfig::default(), tile, 1000, &[10], None)
            .await
            .unwrap();
        assert_eq!(value["querySize"], json!(1000));
        assert_eq!(value["maxCount"], json!(10));
    }

    #[tokio::test]
    async fn test_sample_empty_tile() {
        let tile = TileCoord::parse("10/525/365").unwrap();
        let value = sample(&EngineConfig::default(), tile, 1000, &[0], None)
            .await
            .unwrap();
        assert_eq!(value["empty"], json!(true));
    }

    #[tokio::test]
    async fn test_sample_dense_tile_shrinks() {
        let tile = TileCoord::parse("10/525/365").unwrap();
        let value = sample(&EngineConfig::default(), tile, 1000, &[500, 5000], None)
            .await
            .unwrap();
        assert_eq!(value["maxCount"], json!(5000));
        assert!(value["querySize"].as_u64().unwrap() <= 1000);
    }

    #[test]
    fn test_too_many_counts() {
        let tile = TileCoord::parse("0/0/0").unwrap();
        assert!(KnownCounts::new(tile, &[1, 2, 3, 4]).is_err());
    }
}
