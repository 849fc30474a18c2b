use crate::core::cell::{OrderCell, OrderGroup};
use crate::core::data::{Cell, OutPoint, Script};
use crate::core::error::Error;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{trace, warn};

/// Which field of a cell a [`CellQuery`] matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Lock,
    Type,
}

/// A cell-search query: select every live cell whose `script_type` field equals `script`, with
/// an optional secondary script to narrow the match further.
#[derive(Debug, Clone)]
pub struct CellQuery {
    pub script: Script,
    pub script_type: ScriptType,
    pub secondary_script: Option<Script>,
    pub limit: u32,
}

/// The blockchain-facing contract `find_orders` consumes. Safe for concurrent use: discovery
/// issues the two initial scans in parallel and, within each master bucket, may issue a chain of
/// `get_cell` lookups concurrently across buckets.
pub trait BlockchainClient: Send + Sync {
    /// Error type surfaced by RPC failures; propagated unchanged through `find_orders`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns every live cell matching `query`, fully paginated.
    fn find_cells_on_chain(
        &self,
        query: &CellQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Cell>, Self::Error>> + Send;

    /// Fetches a single cell by its outpoint, or `None` if it does not exist (or is already
    /// spent).
    fn get_cell(&self, out_point: OutPoint) -> impl std::future::Future<Output = Result<Option<Cell>, Self::Error>> + Send;
}

/// Wraps a client's associated error into this crate's [`Error`], so `find_orders` can propagate
/// RPC failures through the same `Result` type as every other fallible entry point.
fn wrap_client_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
    Error::Client(Box::new(err))
}

/// Scans the chain for every live order and resolves each one to its current live descendant.
///
/// This is the one part of the core that genuinely suspends on I/O. It is modeled as a plain
/// `async fn` returning the complete, in-memory set of discovered groups — built by draining a
/// [`FuturesUnordered`] of per-master lookups — rather than a `Stream`: discovery's yields are
/// unordered, so nothing is lost by collecting eagerly, and the public API stays free of a
/// pinned-stream lifetime. Dropping the future mid-flight cancels every still-pending lookup.
pub async fn find_orders<C: BlockchainClient>(
    client: &C,
    order_script: Script,
    udt_script: Script,
    limit: u32,
) -> Result<Vec<OrderGroup>, Error> {
    let order_query = CellQuery {
        script: order_script.clone(),
        script_type: ScriptType::Lock,
        secondary_script: Some(udt_script),
        limit,
    };
    let master_query = CellQuery {
        script: order_script,
        script_type: ScriptType::Type,
        secondary_script: None,
        limit,
    };

    let (order_cells, master_cells) = futures::try_join!(
        async { client.find_cells_on_chain(&order_query).await.map_err(wrap_client_error) },
        async { client.find_cells_on_chain(&master_query).await.map_err(wrap_client_error) },
    )?;

    let orders: Vec<OrderCell> = order_cells
        .into_iter()
        .filter_map(|cell| match OrderCell::try_from_cell(cell) {
            Ok(order) => Some(order),
            Err(err) => {
                trace!(target: "ickb_order_core::discovery", %err, "skipped malformed order cell");
                None
            }
        })
        .collect();

    let mut buckets: HashMap<OutPoint, (Cell, Vec<OrderCell>)> = HashMap::new();
    for master_cell in master_cells {
        buckets.insert(master_cell.out_point, (master_cell, Vec::new()));
    }
    for order in orders {
        let Ok(master_out_point) = order.master_out_point() else {
            continue;
        };
        if let Some((_, bucket)) = buckets.get_mut(&master_out_point) {
            bucket.push(order);
        }
    }

    let mut lookups = FuturesUnordered::new();
    for (master_out_point, (master_cell, orders)) in buckets {
        if orders.is_empty() {
            continue;
        }
        lookups.push(async move {
            let origin = find_origin(client, master_out_point).await?;
            let Some(origin) = origin else {
                warn!(target: "ickb_order_core::discovery", "no origin found for master bucket");
                return Ok(None);
            };
            let Some(live) = origin.resolve(&orders) else {
                return Ok(None);
            };
            OrderGroup::new(master_cell, live.clone(), origin).map(Some)
        });
    }

    let mut groups = Vec::new();
    while let Some(result) = lookups.next().await {
        match result {
            Ok(Some(group)) => groups.push(group),
            Ok(None) => {}
            Err(err) => return Err(err),
        }
    }

    Ok(groups)
}

/// Finds the one cell in `master_out_point`'s own transaction whose resolved master reference
/// equals `master_out_point`: the originally-minted order. Scans backwards from the master's own
/// index toward 0 first (the canonical mint emits the order immediately before its master, at
/// `distance = +1`), then forwards, stopping at the first missing cell in each direction.
async fn find_origin<C: BlockchainClient>(client: &C, master_out_point: OutPoint) -> Result<Option<OrderCell>, Error> {
    for index in (0..master_out_point.index).rev() {
        let candidate = OutPoint {
            tx_hash: master_out_point.tx_hash,
            index,
        };
        match client.get_cell(candidate).await.map_err(wrap_client_error)? {
            None => break,
            Some(cell) => {
                if let Ok(order) = OrderCell::try_from_cell(cell) {
                    if order.master_out_point().map(|m| m == master_out_point).unwrap_or(false) {
                        return Ok(Some(order));
                    }
                }
            }
        }
    }

    let mut index = master_out_point.index + 1;
    loop {
        let candidate = OutPoint {
            tx_hash: master_out_point.tx_hash,
            index,
        };
        match client.get_cell(candidate).await.map_err(wrap_client_error)? {
            None => return Ok(None),
            Some(cell) => {
                if let Ok(order) = OrderCell::try_from_cell(cell) {
                    if order.master_out_point().map(|m| m == master_out_point).unwrap_or(false) {
                        return Ok(Some(order));
                    }
                }
                index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::{Byte32, CellOutput, MasterRef, OrderData, ScriptHashType};
    use crate::core::ratio::{Info, Ratio};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    fn script(tag: u8) -> Script {
        Script {
            code_hash: Byte32([tag; 32]),
            hash_type: ScriptHashType::Type,
            args: vec![],
        }
    }

    fn order_cell(tx_hash: [u8; 32], index: u32, master: MasterRef, udt_amount: u128, ckb_unoccupied: u128) -> Cell {
        let data = OrderData {
            udt_amount,
            master,
            info: Info {
                ckb_to_udt: Ratio::new(1, 1).unwrap(),
                udt_to_ckb: Ratio::EMPTY,
                ckb_min_match_log: 0,
            },
        };
        let mut cell = Cell {
            out_point: OutPoint {
                tx_hash: Byte32(tx_hash),
                index,
            },
            output: CellOutput {
                capacity: 0,
                lock: script(1),
                type_: Some(script(2)),
            },
            data: data.encode(),
        };
        cell.output.capacity = crate::core::cell::occupied_capacity(&cell) + ckb_unoccupied;
        cell
    }

    fn master_cell(tx_hash: [u8; 32], index: u32) -> Cell {
        Cell {
            out_point: OutPoint {
                tx_hash: Byte32(tx_hash),
                index,
            },
            output: CellOutput {
                capacity: 1,
                lock: script(3),
                type_: Some(script(1)),
            },
            data: Vec::new(),
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake client error")]
    struct FakeClientError;

    struct FakeClient {
        cells: Mutex<StdHashMap<(([u8; 32]), u32), Cell>>,
    }

    impl FakeClient {
        fn new(cells: Vec<Cell>) -> Self {
            let mut map = StdHashMap::new();
            for cell in cells {
                map.insert((cell.out_point.tx_hash.0, cell.out_point.index), cell);
            }
            FakeClient { cells: Mutex::new(map) }
        }
    }

    impl BlockchainClient for FakeClient {
        type Error = FakeClientError;

        async fn find_cells_on_chain(&self, query: &CellQuery) -> Result<Vec<Cell>, Self::Error> {
            let cells = self.cells.lock().unwrap();
            let matched = cells
                .values()
                .filter(|cell| match query.script_type {
                    ScriptType::Lock => cell.output.lock == query.script,
                    ScriptType::Type => cell.output.type_.as_ref() == Some(&query.script),
                })
                .filter(|cell| {
                    query
                        .secondary_script
                        .as_ref()
                        .map(|s| cell.output.type_.as_ref() == Some(s))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            Ok(matched)
        }

        async fn get_cell(&self, out_point: OutPoint) -> Result<Option<Cell>, Self::Error> {
            let cells = self.cells.lock().unwrap();
            Ok(cells.get(&(out_point.tx_hash.0, out_point.index)).cloned())
        }
    }

    #[tokio::test]
    async fn finds_freshly_minted_order() {
        let tx_hash = [4u8; 32];
        let order = order_cell(tx_hash, 0, MasterRef::Relative { distance: 1 }, 500, 10_000);
        let master = master_cell(tx_hash, 1);

        let client = FakeClient::new(vec![order, master]);
        let groups = find_orders(&client, script(1), script(2), 400).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].order.data.udt_amount, 500);
        assert!(groups[0].order.data.is_mint());
    }

    #[tokio::test]
    async fn resolves_to_live_descendant_past_origin() {
        let tx_hash = [5u8; 32];
        let origin_out_point = OutPoint {
            tx_hash: Byte32(tx_hash),
            index: 0,
        };
        let origin = order_cell(tx_hash, 0, MasterRef::Relative { distance: 1 }, 500, 10_000);
        let master = master_cell(tx_hash, 1);

        let descendant_tx = [6u8; 32];
        let descendant = order_cell(
            descendant_tx,
            0,
            MasterRef::Absolute {
                out_point: OutPoint {
                    tx_hash: Byte32(tx_hash),
                    index: 1,
                },
            },
            400,
            10_000,
        );
        let _ = origin_out_point;

        let client = FakeClient::new(vec![origin, master, descendant]);
        let groups = find_orders(&client, script(1), script(2), 400).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].order.data.udt_amount, 400);
        assert_eq!(groups[0].origin.data.udt_amount, 500);
    }

    #[tokio::test]
    async fn skips_master_bucket_with_no_orders() {
        let tx_hash = [7u8; 32];
        let master = master_cell(tx_hash, 0);
        let client = FakeClient::new(vec![master]);
        let groups = find_orders(&client, script(1), script(2), 400).await.unwrap();
        assert!(groups.is_empty());
    }
}
