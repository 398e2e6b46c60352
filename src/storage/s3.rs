//! AWS S3 object fetcher.
//!
//! Reads objects from a single S3 (or S3-compatible) bucket.  The client
//! is constructed once at startup and shared across all requests.
//!
//! Credentials are either the static pair from configuration or, when
//! absent, resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.).
//!
//! Gateway keys are request paths and start with `/`.  S3 object names
//! do not, so one leading `/` is stripped before the `GetObject` call:
//! `/images/logo.png` reads the object `images/logo.png`, and
//! `//a` reads the object `/a`.

use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::fetcher::{FetchOutcome, ObjectBody, ObjectFetcher, ObjectMetadata};
use crate::config::S3StorageConfig;

/// Fetcher that reads objects from one S3 bucket.
pub struct S3Fetcher {
    /// AWS S3 SDK client.
    client: Client,
    /// The bucket every key is resolved against.
    bucket: String,
}

impl S3Fetcher {
    /// Create a new S3 fetcher from the storage configuration.
    pub async fn new(config: &S3StorageConfig) -> anyhow::Result<Self> {
        let region = config
            .region
            .clone()
            .ok_or_else(|| anyhow::anyhow!("storage.s3.region is not set"))?;

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        config_loader = config_loader.endpoint_url(config.endpoint(&region));

        if let (Some(ak), Some(sk)) = (&config.access_key_id, &config.secret_access_key) {
            let creds = aws_sdk_s3::config::Credentials::new(
                ak,
                sk,
                None, // session_token
                None, // expiry
                "s3proxy-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 fetcher initialized: bucket={} region={} endpoint={}",
            config.bucket,
            region,
            config.endpoint(&region)
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Map an AWS SDK error to an anyhow error with context.
    ///
    /// Dispatch, timeout and credential failures only say "unhandled
    /// error" at the top level, so the whole source chain is rendered.
    fn map_sdk_error<E: std::error::Error>(context: &str, err: &E) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {}", DisplayErrorContext(err))
    }
}

/// S3 object name for a gateway key.
fn object_name(key: &str) -> &str {
    key.strip_prefix('/').unwrap_or(key)
}

/// Classify a failed `GetObject` call.
fn outcome_from_error(err: SdkError<GetObjectError>) -> FetchOutcome {
    if err
        .as_service_error()
        .is_some_and(GetObjectError::is_no_such_key)
    {
        return FetchOutcome::NotFound;
    }
    FetchOutcome::Failed(S3Fetcher::map_sdk_error("get_object", &err))
}

/// Extract the metadata fields the gateway cares about.
fn metadata_from_output(resp: &GetObjectOutput) -> ObjectMetadata {
    ObjectMetadata {
        content_type: resp.content_type().map(str::to_string),
        // S3 never reports a negative length; drop one rather than wrap.
        content_length: resp.content_length().and_then(|n| u64::try_from(n).ok()),
        content_disposition: resp.content_disposition().map(str::to_string),
        last_modified: resp
            .last_modified()
            .and_then(|dt| SystemTime::try_from(*dt).ok()),
    }
}

impl ObjectFetcher for S3Fetcher {
    fn fetch(&self, key: &str) -> Pin<Box<dyn Future<Output = FetchOutcome> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let name = object_name(&key);
            debug!("S3 get_object: bucket={} object={}", self.bucket, name);

            let resp = match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(name)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => return outcome_from_error(e),
            };

            let metadata = metadata_from_output(&resp);
            let body = ObjectBody::new(resp.body.into_async_read());

            FetchOutcome::Found(metadata, body)
        })
    }
}
