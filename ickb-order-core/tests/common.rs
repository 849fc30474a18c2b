#![allow(dead_code)]

use ickb_order_core::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn script(tag: u8) -> Script {
    Script {
        code_hash: Byte32([tag; 32]),
        hash_type: ScriptHashType::Type,
        args: vec![],
    }
}

pub const ORDER_SCRIPT_TAG: u8 = 1;
pub const UDT_SCRIPT_TAG: u8 = 2;
pub const MASTER_LOCK_TAG: u8 = 3;

/// Builds a live order cell whose capacity is exactly `occupied + ckb_unoccupied`.
pub fn make_order(
    tx_hash: [u8; 32],
    index: u32,
    master: MasterRef,
    ckb_unoccupied: FixedPoint,
    udt_amount: FixedPoint,
    ckb_to_udt: Ratio,
    udt_to_ckb: Ratio,
    ckb_min_match_log: u8,
) -> OrderCell {
    let data = OrderData {
        udt_amount,
        master,
        info: Info {
            ckb_to_udt,
            udt_to_ckb,
            ckb_min_match_log,
        },
    };
    let mut cell = Cell {
        out_point: OutPoint {
            tx_hash: Byte32(tx_hash),
            index,
        },
        output: CellOutput {
            capacity: 0,
            lock: script(ORDER_SCRIPT_TAG),
            type_: Some(script(UDT_SCRIPT_TAG)),
        },
        data: data.encode(),
    };
    cell.output.capacity = occupied_capacity(&cell) + ckb_unoccupied;
    OrderCell::new(cell, data).unwrap()
}

pub fn master_cell(tx_hash: [u8; 32], index: u32) -> Cell {
    Cell {
        out_point: OutPoint {
            tx_hash: Byte32(tx_hash),
            index,
        },
        output: CellOutput {
            capacity: 1,
            lock: script(MASTER_LOCK_TAG),
            type_: Some(script(ORDER_SCRIPT_TAG)),
        },
        data: Vec::new(),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("fake client error")]
pub struct FakeClientError;

/// A trivial in-memory `BlockchainClient`, keyed by outpoint, used by every discovery test.
pub struct FakeClient {
    cells: Mutex<HashMap<([u8; 32], u32), Cell>>,
}

impl FakeClient {
    pub fn new(cells: Vec<Cell>) -> Self {
        let mut map = HashMap::new();
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

/// A trivial in-memory `TransactionSkeleton` recording everything appended to it, used by every
/// mint/match/melt test.
#[derive(Default)]
pub struct FakeTx {
    pub cell_deps: Vec<CellOutput>,
    pub handlers: Vec<Script>,
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<PendingOutput>,
}

impl FakeTx {
    pub fn new() -> Self {
        FakeTx::default()
    }
}

impl TransactionSkeleton for FakeTx {
    fn add_cell_dep(&mut self, dep: CellOutput) {
        self.cell_deps.push(dep);
    }

    fn add_udt_handler(&mut self, handler: Script) {
        self.handlers.push(handler);
    }

    fn add_input(&mut self, out_point: OutPoint) {
        self.inputs.push(out_point);
    }

    fn add_output(&mut self, output: CellOutput, data: Vec<u8>) -> usize {
        self.outputs.push(PendingOutput {
            lock: output.lock,
            type_: output.type_,
            capacity: output.capacity,
            data,
        });
        self.outputs.len() - 1
    }

    fn outputs_mut(&mut self) -> &mut [PendingOutput] {
        &mut self.outputs
    }
}
