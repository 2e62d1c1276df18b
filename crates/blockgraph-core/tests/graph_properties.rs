//! Property tests for the block graph: arbitrary connect, disconnect and
//! delete sequences never give a block two parents or form a cycle, and
//! deletion always takes the whole subtree with it.

use blockgraph_core::{
    Block, BlockId, BlockShape, EventKind, Input, InputKey, Link, Transaction, Workspace,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const BLOCKS: usize = 6;

fn statement() -> Block {
    Block::new("controls_repeat", BlockShape::statement())
        .with_input(Input::statement(InputKey::Stack, "do"))
        .with_input(Input::value(InputKey::Value, "times"))
}

fn seeded() -> (Workspace, Vec<BlockId>) {
    let mut ws = Workspace::new();
    let mut tx = Transaction::user();
    let ids = (0..BLOCKS)
        .map(|_| ws.add_block(statement(), &mut tx))
        .collect();
    (ws, ids)
}

/// Walks up from `id`; fails if the walk revisits a block.
fn acyclic_from(ws: &Workspace, id: BlockId) -> bool {
    let mut seen = vec![id];
    let mut current = id;
    while let Some((parent, _)) = ws.parent(current) {
        if seen.contains(&parent) {
            return false;
        }
        seen.push(parent);
        current = parent;
    }
    true
}

#[derive(Debug, Clone)]
enum Op {
    Stack(usize, usize),
    Next(usize, usize),
    Disconnect(usize),
    Delete(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..BLOCKS, 0..BLOCKS).prop_map(|(a, b)| Op::Stack(a, b)),
        (0..BLOCKS, 0..BLOCKS).prop_map(|(a, b)| Op::Next(a, b)),
        (0..BLOCKS).prop_map(Op::Disconnect),
        (0..BLOCKS).prop_map(Op::Delete),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn graph_stays_a_forest(ops in proptest::collection::vec(op(), 1..40)) {
        let (mut ws, ids) = seeded();
        let mut tx = Transaction::user();
        for op in &ops {
            // Refused connections and missing blocks are expected here.
            let _ = match *op {
                Op::Stack(a, b) => ws
                    .connect(ids[a], Link::Input(InputKey::Stack), ids[b], &mut tx)
                    .map(|_| ()),
                Op::Next(a, b) => ws.connect(ids[a], Link::Next, ids[b], &mut tx).map(|_| ()),
                Op::Disconnect(a) => ws.disconnect(ids[a], &mut tx).map(|_| ()),
                Op::Delete(a) => ws.delete_block(ids[a], &mut tx).map(|_| ()),
            };

            for &id in ids.iter().filter(|&&id| ws.contains(id)) {
                prop_assert!(acyclic_from(&ws, id), "cycle through {:?} after {:?}", id, op);
                if let Some((parent, _)) = ws.parent(id) {
                    prop_assert!(ws.contains(parent));
                }
            }
        }
    }

    #[test]
    fn delete_removes_subtree(ops in proptest::collection::vec(op(), 1..20), victim in 0..BLOCKS) {
        let (mut ws, ids) = seeded();
        let mut tx = Transaction::user();
        for op in &ops {
            if let Op::Stack(a, b) = *op {
                let _ = ws.connect(ids[a], Link::Input(InputKey::Stack), ids[b], &mut tx);
            }
        }

        let subtree = ws.descendants(ids[victim]);
        let deleted = ws.delete_block(ids[victim], &mut tx).unwrap();
        prop_assert_eq!(deleted[0], ids[victim]);
        for id in subtree {
            prop_assert!(!ws.contains(id));
            prop_assert!(deleted.contains(&id));
        }
        prop_assert_eq!(ws.block_count(), BLOCKS - deleted.len());
    }
}

// ---------------------------------------------------------------------------
// Connections and events
// ---------------------------------------------------------------------------

#[test]
fn occupied_input_is_refused() {
    let (mut ws, ids) = seeded();
    let mut tx = Transaction::user();
    ws.connect(ids[0], Link::Input(InputKey::Stack), ids[1], &mut tx)
        .unwrap();
    assert!(ws
        .connect(ids[0], Link::Input(InputKey::Stack), ids[2], &mut tx)
        .is_err());
    assert!(ws
        .connect(ids[0], Link::Input(InputKey::Value), ids[2], &mut tx)
        .is_err());
}

#[test]
fn reconnect_displaces_occupant() {
    let mut ws = Workspace::new();
    let mut tx = Transaction::user();
    let call = ws.add_block(
        Block::new("procedures_callnoreturn", BlockShape::statement())
            .with_input(Input::value(InputKey::Arg(0), "a"))
            .with_input(Input::value(InputKey::Arg(1), "b")),
        &mut tx,
    );
    let first = ws.add_block(Block::new("math_number", BlockShape::value()), &mut tx);
    let second = ws.add_block(Block::new("math_number", BlockShape::value()), &mut tx);
    ws.connect(call, Link::Input(InputKey::Arg(0)), first, &mut tx)
        .unwrap();
    ws.connect(call, Link::Input(InputKey::Arg(1)), second, &mut tx)
        .unwrap();

    assert!(ws.reconnect(second, call, &InputKey::Arg(0), &mut tx));
    assert_eq!(ws.target_block(call, &InputKey::Arg(0)), Some(second));
    assert!(ws.parent(first).is_none());
    assert!(ws.reconnect(first, call, &InputKey::Arg(1), &mut tx));
    assert_eq!(ws.target_block(call, &InputKey::Arg(1)), Some(first));
}

#[test]
fn suppressed_events_are_not_undoable() {
    let mut ws = Workspace::new();
    let mut tx = Transaction::user();
    ws.add_block(statement(), &mut tx);
    tx.suppress();
    ws.add_block(statement(), &mut tx);
    tx.resume();

    let flags: Vec<_> = tx.events().iter().map(|e| e.record_undo).collect();
    assert_eq!(flags, [true, false]);
    assert!(tx.has_undoable());

    let mut quiet = Transaction::programmatic();
    let id = ws.add_block(statement(), &mut quiet);
    assert!(!quiet.has_undoable());
    assert!(matches!(
        &quiet.events()[0].kind,
        EventKind::Create { ids } if ids.as_slice() == [id]
    ));
}
