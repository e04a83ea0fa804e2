//! The processors of the quantiles pipeline.
//!
//! Every processor in an app shares one value type, so the pipeline's
//! payload is a small enum: scalars out of the source, integer vectors out
//! of the windowing stages.
use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use trellis::store::{MemStore, SourceStore};
use trellis::{async_trait, Context, Error, Processor, Result};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Val {
    Int(i64),
    Ints(Vec<i64>),
}

impl Val {
    fn as_int(&self) -> Result<i64> {
        match self {
            Val::Int(v) => Ok(*v),
            other => Err(Error::Application(anyhow!("expected scalar, got {other:?}"))),
        }
    }

    fn into_ints(self) -> Result<Vec<i64>> {
        match self {
            Val::Ints(v) => Ok(v),
            other => Err(Error::Application(anyhow!("expected vector, got {other:?}"))),
        }
    }
}

/// Source over a stored array of integers.
pub struct StoredInts {
    store: MemStore<i64>,
}

impl StoredInts {
    pub fn new(store: MemStore<i64>) -> Self {
        Self { store }
    }

    /// A deterministic pseudo-random array: `len` values in `[0, max)`.
    pub fn seeded(seed: u64, len: usize, max: i64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let values = (0..len).map(|_| rng.gen_range(0..max)).collect();
        Self::new(MemStore::new(values))
    }
}

#[async_trait]
impl Processor<Val> for StoredInts {
    async fn compute(&self, key: u64, _ctx: &Context<'_, Val>) -> Result<Val> {
        // A missing key converts to the end-of-array condition.
        Ok(Val::Int(self.store.get(key)?))
    }
}

/// Sliding window over a scalar input: element `k` covers input keys
/// `[k * step, k * step + size)`.
pub struct Window {
    pub size: u64,
    pub step: u64,
}

#[async_trait]
impl Processor<Val> for Window {
    async fn compute(&self, key: u64, ctx: &Context<'_, Val>) -> Result<Val> {
        let input = ctx.input(0);
        let start = key * self.step;
        let mut out = Vec::with_capacity(self.size as usize);
        for i in start..start + self.size {
            out.push(input.get(i).await?.as_int()?);
        }
        Ok(Val::Ints(out))
    }
}

/// Sorts each window.
pub struct SortWindow;

#[async_trait]
impl Processor<Val> for SortWindow {
    async fn compute(&self, key: u64, ctx: &Context<'_, Val>) -> Result<Val> {
        let mut values = ctx.input(0).get(key).await?.into_ints()?;
        values.sort_unstable();
        Ok(Val::Ints(values))
    }
}

/// Emits the `q - 1` internal quantile boundaries of each sorted window.
pub struct Quantiles {
    pub q: usize,
}

#[async_trait]
impl Processor<Val> for Quantiles {
    async fn compute(&self, key: u64, ctx: &Context<'_, Val>) -> Result<Val> {
        let sorted = ctx.input(0).get(key).await?.into_ints()?;
        let bin = sorted.len() / self.q;
        let out = (1..self.q).map(|k| sorted[bin * k]).collect();
        Ok(Val::Ints(out))
    }
}
