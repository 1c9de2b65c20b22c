//! Core library for cloud carbon estimation
//!
//! This crate provides the building blocks of the carbon computation
//! engine:
//! - Typed resource records for pods, applications, VMs and storage
//! - A declarative node graph with the energy and carbon formulas
//! - Manifest assembly and an injectable evaluator boundary
//! - Telemetry alignment onto a uniform sampling grid
//! - Chunked, order-preserving parallel evaluation

pub mod align;
pub mod catalog;
pub mod chunk;
pub mod constants;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod intensity;
pub mod manifest;
pub mod models;
pub mod pipeline;

pub use error::{Error, Result};
pub use evaluate::{EvaluationReport, Evaluator, ReferenceEvaluator};
pub use models::*;
pub use pipeline::{AppOutput, AppPipeline, StoragePipeline, VmPipeline};
