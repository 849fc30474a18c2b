mod common;

use crate::common::*;
use ickb_order_core::prelude::*;

/// A descendant that regresses `absProgress` must be rejected, and must not be picked by
/// `resolve` even when it is the only candidate offered.
#[test]
fn descendant_with_regressed_progress_is_rejected() {
    let origin = make_order(
        [1u8; 32],
        0,
        MasterRef::Relative { distance: 1 },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );
    let master_out_point = origin.master_out_point().unwrap();

    let descendant = make_order(
        [2u8; 32],
        0,
        MasterRef::Absolute {
            out_point: master_out_point,
        },
        10_000,
        400, // lower than origin's 500 -> absProgress regresses
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );

    assert!(origin.validate_descendant(&descendant).is_err());
    assert!(origin.resolve(&[descendant]).is_none());
}

/// A descendant with a different `info` (a different price) must be rejected even if its
/// progress and total both increased — `info` must match byte-for-byte.
#[test]
fn descendant_with_different_info_is_rejected() {
    let origin = make_order(
        [3u8; 32],
        0,
        MasterRef::Relative { distance: 1 },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );
    let master_out_point = origin.master_out_point().unwrap();

    let descendant = make_order(
        [4u8; 32],
        0,
        MasterRef::Absolute {
            out_point: master_out_point,
        },
        10_000,
        900,
        Ratio::new(2, 1).unwrap(), // different price
        Ratio::EMPTY,
        0,
    );

    assert!(origin.validate_descendant(&descendant).is_err());
}

/// When a confused/duplicate cell and the legitimate descendant share the same `absProgress`,
/// `resolve` must prefer the non-mint (already-matched) cell over the mint.
#[test]
fn resolve_prefers_absolute_master_over_mint_on_progress_tie() {
    let origin = make_order(
        [5u8; 32],
        0,
        MasterRef::Relative { distance: 1 },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );
    let master_out_point = origin.master_out_point().unwrap();

    let mint_descendant = make_order(
        [5u8; 32],
        0,
        MasterRef::Relative { distance: 1 },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );
    let absolute_descendant = make_order(
        [6u8; 32],
        0,
        MasterRef::Absolute {
            out_point: master_out_point,
        },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );

    let resolved = origin
        .resolve(&[mint_descendant.clone(), absolute_descendant.clone()])
        .unwrap();
    assert_eq!(resolved, &absolute_descendant);
    assert!(!resolved.data.is_mint());
}

/// A descendant sharing the same outpoint as the origin trivially validates (it is the same
/// cell) even with no further checks applied.
#[test]
fn descendant_with_same_outpoint_trivially_validates() {
    let origin = make_order(
        [7u8; 32],
        0,
        MasterRef::Relative { distance: 1 },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );
    assert!(origin.validate_descendant(&origin).is_ok());
}

/// `OrderGroup::new` cross-checks that `origin`'s own resolved master equals the supplied
/// master cell's outpoint, rejecting a group assembled against the wrong witness.
#[test]
fn order_group_rejects_mismatched_master() {
    let origin = make_order(
        [8u8; 32],
        0,
        MasterRef::Relative { distance: 1 },
        10_000,
        500,
        Ratio::new(1, 1).unwrap(),
        Ratio::EMPTY,
        0,
    );
    let wrong_master = master_cell([255u8; 32], 9);
    let order = origin.clone();
    assert!(OrderGroup::new(wrong_master, order, origin).is_err());
}
