//! Property tests: arbitrary edit sequences keep every call in line with its
//! definition, and argument values follow their parameters through
//! reordering inside an edit session.

use blockgraph_core::{Block, BlockId, BlockShape, InputKey, Position};
use blockgraph_procs::{EditorTree, ProcedureKind, ProcedureWorkspace};
use proptest::prelude::*;

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

// ---------------------------------------------------------------------------
// Edit sequences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Edit {
    SetParams(Vec<usize>),
    AddCall,
    DeleteCall(usize),
    Rename(usize),
    PasteOrphan(usize),
    Undo,
    Redo,
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        proptest::sample::subsequence((0..NAMES.len()).collect::<Vec<_>>(), 0..=4)
            .prop_shuffle()
            .prop_map(Edit::SetParams),
        Just(Edit::AddCall),
        (0..4usize).prop_map(Edit::DeleteCall),
        (0..NAMES.len()).prop_map(Edit::Rename),
        (0..NAMES.len()).prop_map(Edit::PasteOrphan),
        Just(Edit::Undo),
        Just(Edit::Redo),
    ]
}

fn apply(ws: &mut ProcedureWorkspace, def: BlockId, edit: &Edit) {
    if ws.definition(def).is_none() {
        return;
    }
    match edit {
        Edit::SetParams(indices) => {
            let names: Vec<&str> = indices.iter().map(|&i| NAMES[i]).collect();
            ws.set_parameter_names(def, &names).unwrap();
        }
        Edit::AddCall => {
            ws.place_call(def, Position::default()).unwrap();
        }
        Edit::DeleteCall(n) => {
            let name = ws.definition(def).unwrap().name.clone();
            if let Some(&call) = ws.callers(&name).get(*n) {
                ws.delete_block(call).unwrap();
            }
        }
        Edit::Rename(i) => {
            ws.rename_definition(def, &format!("proc_{}", NAMES[*i]))
                .unwrap();
        }
        Edit::PasteOrphan(i) => {
            ws.place_orphan_call(
                ProcedureKind::NoReturn,
                &format!("proc_{}", NAMES[*i]),
                &[NAMES[*i]],
                Position::default(),
            )
            .unwrap();
        }
        Edit::Undo => {
            ws.undo().unwrap();
        }
        Edit::Redo => {
            ws.redo().unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn edits_keep_calls_in_sync(edits in proptest::collection::vec(edit(), 1..24)) {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::NoReturn, "proc", Position::default())
            .unwrap();
        for edit in &edits {
            apply(&mut ws, def, edit);
            let problems = ws.check_consistency();
            prop_assert!(problems.is_empty(), "after {:?}: {:?}", edit, problems);
        }
    }
}

// ---------------------------------------------------------------------------
// Reattachment
// ---------------------------------------------------------------------------

struct Fixture {
    ws: ProcedureWorkspace,
    def: BlockId,
    call: BlockId,
    values: Vec<BlockId>,
}

fn fixture(params: usize) -> Fixture {
    let mut ws = ProcedureWorkspace::default();
    let def = ws
        .place_definition(ProcedureKind::NoReturn, "f", Position::default())
        .unwrap();
    ws.set_parameter_names(def, &NAMES[..params]).unwrap();
    let call = ws.place_call(def, Position::default()).unwrap();
    let mut values = Vec::with_capacity(params);
    for i in 0..params {
        let value = ws
            .add_plain_block(Block::new("math_number", BlockShape::value()))
            .unwrap();
        ws.connect_input(call, InputKey::Arg(i), value).unwrap();
        values.push(value);
    }
    Fixture {
        ws,
        def,
        call,
        values,
    }
}

/// Parameter count and the rows kept, in their new order.
fn kept_rows() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1..=NAMES.len()).prop_flat_map(|n| {
        proptest::sample::subsequence((0..n).collect::<Vec<_>>(), 0..=n)
            .prop_shuffle()
            .prop_map(move |kept| (n, kept))
    })
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn values_follow_parameters_through_a_session((n, kept) in kept_rows()) {
        let Fixture { mut ws, def, call, values } = fixture(n);

        let original = ws.open_editor(def).unwrap();
        let edited = EditorTree {
            rows: kept.iter().map(|&i| original.rows[i].clone()).collect(),
            has_statements: original.has_statements,
        };
        ws.apply_editor(def, edited).unwrap();

        for (slot, &i) in kept.iter().enumerate() {
            prop_assert_eq!(
                ws.workspace().target_block(call, &InputKey::Arg(slot)),
                Some(values[i])
            );
        }
        for (i, &value) in values.iter().enumerate() {
            if !kept.contains(&i) {
                prop_assert!(ws.workspace().parent(value).is_none());
            }
        }

        // Restoring the original order brings every value back.
        ws.apply_editor(def, original).unwrap();
        ws.close_editor(def).unwrap();
        for (i, &value) in values.iter().enumerate() {
            prop_assert_eq!(
                ws.workspace().target_block(call, &InputKey::Arg(i)),
                Some(value)
            );
        }
        prop_assert!(ws.check_consistency().is_empty());
    }
}
