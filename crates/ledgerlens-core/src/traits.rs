//! Core kernel traits.
//!
//! - `AnalysisKernel`: base trait for detectors and pipeline stages
//! - `BatchKernel`: async request/response execution

use crate::error::Result;
use crate::kernel::KernelMetadata;
use async_trait::async_trait;
use std::fmt::Debug;

/// Base trait for all kernels.
pub trait AnalysisKernel: Send + Sync + Debug {
    /// Returns the kernel metadata.
    fn metadata(&self) -> &KernelMetadata;

    /// Validate kernel configuration.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Returns the kernel ID.
    fn id(&self) -> &str {
        &self.metadata().id
    }
}

/// Trait for kernels invoked with a complete input batch.
#[async_trait]
pub trait BatchKernel<I, O>: AnalysisKernel
where
    I: Send + Sync,
    O: Send + Sync,
{
    /// Execute the kernel with the given input.
    async fn execute(&self, input: I) -> Result<O>;

    /// Validate the input before execution.
    ///
    /// Override to provide custom input validation.
    fn validate_input(&self, _input: &I) -> Result<()> {
        Ok(())
    }
}
