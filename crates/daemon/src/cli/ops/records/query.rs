use cidstore_daemon::http_server::api::client::ApiError;
use cidstore_daemon::http_server::api::v0::records::query::{QueryRequest, QueryResponse};

#[derive(Debug, thiserror::Error)]
pub enum RecordQueryError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for QueryRequest {
    type Error = RecordQueryError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let records: QueryResponse = client.call(self.clone()).await?;

        if records.is_empty() {
            return Ok(format!("No records found for {}", self.owner));
        }
        Ok(records
            .iter()
            .map(super::format_record)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
