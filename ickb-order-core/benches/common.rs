use ickb_order_core::prelude::*;

fn script(tag: u8) -> Script {
    Script {
        code_hash: Byte32([tag; 32]),
        hash_type: ScriptHashType::Type,
        args: vec![],
    }
}

/// Builds a live order cell whose capacity is exactly `occupied + ckb_unoccupied`, cycling through
/// a handful of prices so a synthetic pool has some rate dispersion.
pub fn make_order(
    index: u32,
    ckb_unoccupied: FixedPoint,
    udt_amount: FixedPoint,
    ckb_to_udt: Ratio,
    udt_to_ckb: Ratio,
) -> OrderCell {
    let data = OrderData {
        udt_amount,
        master: MasterRef::Relative { distance: 1 },
        info: Info {
            ckb_to_udt,
            udt_to_ckb,
            ckb_min_match_log: 0,
        },
    };
    let mut cell = Cell {
        out_point: OutPoint {
            tx_hash: Byte32([1u8; 32]),
            index,
        },
        output: CellOutput {
            capacity: 0,
            lock: script(1),
            type_: Some(script(2)),
        },
        data: data.encode(),
    };
    cell.output.capacity = occupied_capacity(&cell) + ckb_unoccupied;
    OrderCell::new(cell, data).unwrap()
}

/// A pool of `n` orders split evenly between ckb->udt sellers and udt->ckb sellers, prices cycling
/// through a small band, each large enough to clear the default anti-dust floor many times over.
pub fn make_pool(n: u32) -> Vec<OrderCell> {
    (0..n)
        .map(|i| {
            if i % 2 == 0 {
                let ratio = Ratio::new(2 + (i as u64 % 5), 1).unwrap();
                make_order(i, 10_000_000 + (i as FixedPoint % 500) * 1_000, 0, ratio, Ratio::EMPTY)
            } else {
                let ratio = Ratio::new(1, 2 + (i as u64 % 5)).unwrap();
                make_order(i, 0, 10_000_000 + (i as FixedPoint % 500) * 1_000, Ratio::EMPTY, ratio)
            }
        })
        .collect()
}
