use clap::{Args, Subcommand};

pub mod get;
pub mod list;
pub mod query;
pub mod store;

use crate::cli::op::Op;
use cidstore_daemon::http_server::api::v0::records::{
    GetRequest, ListRequest, QueryRequest, StoreRequest,
};

crate::command_enum! {
    (Store, StoreRequest),
    (Get, GetRequest),
    (List, ListRequest),
    (Query, QueryRequest),
}

pub type RecordsCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Records {
    #[command(subcommand)]
    pub command: RecordsCommand,
}

#[async_trait::async_trait]
impl Op for Records {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

/// One record per line
pub(crate) fn format_record(record: &common::record::CidRecord) -> String {
    format!(
        "{}  {}  {}  {}",
        record.fingerprint,
        record.file_name,
        record.timestamp.to_rfc3339(),
        record.owner
    )
}
