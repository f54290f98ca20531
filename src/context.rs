// Compute backends. A Context owns how arrays are allocated and how a
// per-particle kernel is executed over the ensemble; the physics lives in
// the kernel layer and runs unmodified on every backend.

use std::sync::Arc;

use rayon::prelude::*;

use crate::errors::{Error, Result};
use crate::kernels::{PrtlChunk, PrtlKernel};
use crate::{Float, PRTL_CHUNK_SIZE};

pub trait Context: Send + Sync {
    /// Backend identity, used for logging and to pick NaN-scan code paths.
    fn name(&self) -> &'static str;

    /// Preferred number of slots per dispatch chunk.
    fn chunk_len(&self) -> usize;

    fn alloc_floats(&self, n: usize) -> Vec<Float>;
    fn alloc_ints(&self, n: usize) -> Vec<i64>;
    fn alloc_uints(&self, n: usize) -> Vec<u64>;

    /// Scan an array for NaN.
    fn contains_nan(&self, arr: &[Float]) -> bool;

    /// Apply `kernel` to every slot of every chunk. The chunks are disjoint
    /// windows prepared by the caller, so a backend may walk them in any
    /// order or concurrently; the call returns only when all slots are done.
    fn execute(&self, kernel: &PrtlKernel<'_>, chunks: Vec<PrtlChunk<'_>>);
}

/// Sequential backend: one chunk, one tight loop the compiler can vectorize.
pub struct CpuContext;

impl Context for CpuContext {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn chunk_len(&self) -> usize {
        usize::MAX
    }

    fn alloc_floats(&self, n: usize) -> Vec<Float> {
        vec![0.0; n]
    }

    fn alloc_ints(&self, n: usize) -> Vec<i64> {
        vec![0; n]
    }

    fn alloc_uints(&self, n: usize) -> Vec<u64> {
        vec![0; n]
    }

    fn contains_nan(&self, arr: &[Float]) -> bool {
        arr.iter().any(|v| v.is_nan())
    }

    fn execute(&self, kernel: &PrtlKernel<'_>, mut chunks: Vec<PrtlChunk<'_>>) {
        for chunk in chunks.iter_mut() {
            chunk.run(kernel);
        }
    }
}

/// Thread-parallel backend in the style of a GPU grid: fixed-size chunks
/// dispatched over the rayon pool. Observably equivalent to [`CpuContext`]
/// because kernels only touch their own slot.
pub struct ThreadedContext {
    chunk: usize,
}

impl ThreadedContext {
    pub fn new() -> ThreadedContext {
        ThreadedContext {
            chunk: PRTL_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_len(chunk: usize) -> ThreadedContext {
        ThreadedContext { chunk: chunk.max(1) }
    }
}

impl Default for ThreadedContext {
    fn default() -> ThreadedContext {
        ThreadedContext::new()
    }
}

impl Context for ThreadedContext {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn chunk_len(&self) -> usize {
        self.chunk
    }

    fn alloc_floats(&self, n: usize) -> Vec<Float> {
        vec![0.0; n]
    }

    fn alloc_ints(&self, n: usize) -> Vec<i64> {
        vec![0; n]
    }

    fn alloc_uints(&self, n: usize) -> Vec<u64> {
        vec![0; n]
    }

    fn contains_nan(&self, arr: &[Float]) -> bool {
        arr.par_chunks(self.chunk.max(1))
            .any(|c| c.iter().any(|v| v.is_nan()))
    }

    fn execute(&self, kernel: &PrtlKernel<'_>, chunks: Vec<PrtlChunk<'_>>) {
        chunks.into_par_iter().for_each(|mut chunk| chunk.run(kernel));
    }
}

/// Explicit backend selection at session start; no hidden globals.
pub fn context_from_name(name: &str) -> Result<Arc<dyn Context>> {
    match name {
        "cpu" => Ok(Arc::new(CpuContext)),
        "threads" => Ok(Arc::new(ThreadedContext::new())),
        other => Err(Error::Config(format!(
            "unknown backend '{}', expected 'cpu' or 'threads'",
            other
        ))),
    }
}
