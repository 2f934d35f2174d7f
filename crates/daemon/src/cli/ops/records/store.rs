use cidstore_daemon::http_server::api::client::ApiError;
use cidstore_daemon::http_server::api::v0::records::store::{StoreRequest, StoreResponse};

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for StoreRequest {
    type Error = RecordStoreError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let record: StoreResponse = client.call(self.clone()).await?;

        Ok(format!(
            "Stored {} ({}) for {} at {}",
            record.fingerprint,
            record.file_name,
            record.owner,
            record.timestamp.to_rfc3339()
        ))
    }
}
