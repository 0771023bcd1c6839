//! Shared AWS SDK configuration for the S3 and Glacier adapters.

use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::runtime::BlockingRuntime;

/// Resolve credentials and region through the SDK's default provider chain.
///
/// An explicit `region` overrides whatever the chain would pick.
pub fn load_sdk_config(runtime: &BlockingRuntime, region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    runtime.block_on(loader.load())
}
