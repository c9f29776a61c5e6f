#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/branched-services/gas-oracle/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod response;
pub use response::*;

mod server;
pub use server::*;
