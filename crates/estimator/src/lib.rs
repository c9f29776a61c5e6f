#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/branched-services/gas-oracle/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod engine;
pub use engine::*;

mod error;
pub use error::*;

mod history;
pub use history::*;

mod math;
pub use math::*;

mod metrics;
pub use metrics::*;

mod pool;
pub use pool::*;

mod provider;
pub use provider::*;

mod strategy;
pub use strategy::*;

mod types;
pub use types::*;
