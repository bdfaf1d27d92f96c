//! Feature flag delivery client runtime for Rust.

#![warn(missing_docs)]

#[macro_use]
mod macros;
mod client;
mod connector;
mod constants;
mod errors;
mod eval;
mod metrics;
mod model;
mod options;
mod repository;
mod sync;
mod target;
mod value;

pub use client::Client;
pub use connector::{AuthInfo, Connector, ConnectorError, Message, MessageStream};
pub use constants::PKG_VERSION;
pub use errors::{ClientError, ErrorKind};
pub use metrics::{KeyValue, MetricsData, MetricsPayload, TargetData};

pub use model::config::{
    Clause, Distribution, FeatureConfig, Prerequisite, Segment, Serve, ServingRule, TargetRef,
    Variation, VariationMap, WeightedVariation,
};

pub use model::enums::{Domain, Event, FlagKind, FlagState, Operator};

pub use options::{Options, OptionsBuilder};
pub use repository::{Cache, Entry, InMemoryCache, Repository, Store};
pub use target::{AttributeValue, Target};
pub use value::{FlagValue, ValuePrimitive};
