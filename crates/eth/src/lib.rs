#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/branched-services/gas-oracle/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod client;
pub use client::*;

mod error;
pub use error::*;

mod subscriber;
pub use subscriber::*;

mod types;
pub use types::*;
