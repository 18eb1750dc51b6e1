use crate::config::CopyConfig;
use crate::copy::{CopyConnection, release, run_export, run_import};
use crate::error::CopyResult;

use super::items::{InputItem, OutputItem};
use super::params::{CopyParameters, Operation};

/// Run one invocation on an owned connection and release it afterwards.
///
/// The connection is closed exactly once whether the batch succeeds, fails,
/// or times out; a failed close is logged and never replaces the batch
/// result.
pub async fn run_invocation<C>(
    mut conn: C,
    params: &CopyParameters,
    items: &[InputItem],
    config: &CopyConfig,
) -> CopyResult<Vec<OutputItem>>
where
    C: CopyConnection,
{
    let result = execute_items(&mut conn, params, items, config).await;
    release(&mut conn).await;
    result
}

/// Process every input item on the same connection, stopping at the first failure.
///
/// The operation is parsed before the loop, so an unsupported operation is
/// rejected even when `items` is empty.
pub async fn execute_items<C>(
    conn: &mut C,
    params: &CopyParameters,
    items: &[InputItem],
    config: &CopyConfig,
) -> CopyResult<Vec<OutputItem>>
where
    C: CopyConnection + ?Sized,
{
    let operation = params.operation()?;
    let mut output = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let result = match operation {
            Operation::CopyTo => export_item(conn, params, config).await,
            Operation::CopyFrom => import_item(conn, params, item, config).await,
        };
        match result {
            Ok(produced) => output.push(produced),
            Err(err) => {
                log::error!("item {}: {}", index, err);
                return Err(err);
            }
        }
    }

    Ok(output)
}

async fn export_item<C>(
    conn: &mut C,
    params: &CopyParameters,
    config: &CopyConfig,
) -> CopyResult<OutputItem>
where
    C: CopyConnection + ?Sized,
{
    let request = params.export_request()?;
    let outcome = run_export(conn, &request, config).await?;
    OutputItem::export(
        &outcome,
        request.dialect.format,
        &params.file_name,
        &params.binary_property_name,
    )
}

async fn import_item<C>(
    conn: &mut C,
    params: &CopyParameters,
    item: &InputItem,
    config: &CopyConfig,
) -> CopyResult<OutputItem>
where
    C: CopyConnection + ?Sized,
{
    let payload = item.binary_field(&params.input_binary_field)?.decode()?;
    let request = params.import_request()?;
    let outcome = run_import(conn, &request, payload.as_slice(), config).await?;
    OutputItem::import(&outcome, &request.table, request.dry_run)
}
