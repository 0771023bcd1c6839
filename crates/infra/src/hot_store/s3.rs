//! S3-backed hot store.

use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::instrument;

use strata_core::ObjectLocation;

use super::{HotStore, HotStoreError};
use crate::aws::load_sdk_config;
use crate::runtime::BlockingRuntime;

#[derive(Debug, Clone)]
pub struct S3HotStore {
    client: Client,
    runtime: BlockingRuntime,
}

impl S3HotStore {
    pub fn new(client: Client, runtime: BlockingRuntime) -> Self {
        Self { client, runtime }
    }

    /// Build a client from the default credential chain.
    pub fn from_env(region: Option<&str>) -> Result<Self, HotStoreError> {
        let runtime = BlockingRuntime::new("strata-s3")
            .map_err(|e| HotStoreError::Service(format!("failed to start runtime: {e}")))?;
        let config = load_sdk_config(&runtime, region);
        Ok(Self::new(Client::new(&config), runtime))
    }
}

impl HotStore for S3HotStore {
    #[instrument(skip(self), fields(location = %location), err)]
    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, HotStoreError> {
        self.runtime.block_on(async {
            let output = match self
                .client
                .get_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .send()
                .await
            {
                Ok(output) => output,
                Err(err) => {
                    if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                        return Ok(None);
                    }
                    return Err(HotStoreError::Service(format!(
                        "GetObject {location} failed: {err}"
                    )));
                }
            };

            let bytes = output.body.collect().await.map_err(|e| {
                HotStoreError::Service(format!("reading body of {location} failed: {e}"))
            })?;
            Ok(Some(bytes.into_bytes().to_vec()))
        })
    }

    #[instrument(skip(self, bytes), fields(location = %location, size = bytes.len()), err)]
    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), HotStoreError> {
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&location.bucket)
                    .key(&location.key)
                    .body(ByteStream::from(bytes))
                    .send(),
            )
            .map_err(|e| HotStoreError::Service(format!("PutObject {location} failed: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), fields(location = %location), err)]
    fn delete(&self, location: &ObjectLocation) -> Result<(), HotStoreError> {
        // S3 reports success for keys that do not exist.
        self.runtime
            .block_on(
                self.client
                    .delete_object()
                    .bucket(&location.bucket)
                    .key(&location.key)
                    .send(),
            )
            .map_err(|e| HotStoreError::Service(format!("DeleteObject {location} failed: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), fields(location = %location), err)]
    fn exists(&self, location: &ObjectLocation) -> Result<bool, HotStoreError> {
        let result = self.runtime.block_on(
            self.client
                .head_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .send(),
        );
        match result {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(HotStoreError::Service(format!(
                "HeadObject {location} failed: {err}"
            ))),
        }
    }
}
