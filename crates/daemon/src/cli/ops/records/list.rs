use cidstore_daemon::http_server::api::client::ApiError;
use cidstore_daemon::http_server::api::v0::records::list::{ListRequest, ListResponse};
use common::record::LedgerEntry;

#[derive(Debug, thiserror::Error)]
pub enum RecordListError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for ListRequest {
    type Error = RecordListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let entries: ListResponse = client.call(self.clone()).await?;

        if entries.is_empty() {
            return Ok("No records found".to_string());
        }
        let output = entries
            .iter()
            .map(|entry| match entry {
                LedgerEntry::Record(record) => super::format_record(record),
                LedgerEntry::Raw(raw) => format!("(undecodable) {}", raw),
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(output)
    }
}
