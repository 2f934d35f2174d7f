use cidstore_daemon::http_server::api::client::ApiError;
use cidstore_daemon::http_server::api::v0::records::get::{GetRequest, GetResponse};

#[derive(Debug, thiserror::Error)]
pub enum RecordGetError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for GetRequest {
    type Error = RecordGetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let record: GetResponse = client.call(self.clone()).await?;
        Ok(super::format_record(&record))
    }
}
