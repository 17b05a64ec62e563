//! Property-based tests for the effect chain executor: pass-through on an
//! empty chain and failure neutrality, for arbitrary frame contents.

use frameflow_core::{apply_chain, Catalog, EffectError, Frame, FrameShape};
use proptest::prelude::*;
use std::sync::Arc;

fn arb_frame(height: usize, width: usize) -> impl Strategy<Value = Frame> {
    let shape = FrameShape::new(height, width);
    prop::collection::vec(any::<u8>(), shape.byte_len()).prop_map(move |bytes| Frame::new(shape, bytes))
}

proptest! {
    /// Property 5 (pass-through): an empty chain reproduces the input frame
    /// byte-for-byte, for any frame contents.
    #[test]
    fn prop_empty_chain_is_always_pass_through(frame in arb_frame(4, 4)) {
        let catalog = Catalog::with_default_effects();
        let out = apply_chain(&frame, &[], &catalog);
        prop_assert_eq!(out, frame);
    }

    /// Property 6 (effect neutrality on failure): for chain `[Invert, E,
    /// Invert]` with `E` always failing, the result equals double-invert,
    /// i.e. the original frame, for any frame contents.
    #[test]
    fn prop_always_failing_effect_is_neutral_in_a_chain(frame in arb_frame(3, 5)) {
        let mut catalog = Catalog::with_default_effects();
        catalog.register(
            "AlwaysFails",
            Arc::new(|_f: &Frame| -> Result<Frame, EffectError> {
                Err(EffectError::new("AlwaysFails", "synthetic property-test failure"))
            }),
        );

        let chain = vec!["Invert".to_string(), "AlwaysFails".to_string(), "Invert".to_string()];
        let out = apply_chain(&frame, &chain, &catalog);
        prop_assert_eq!(out, frame);
    }

    /// Unknown effect names are skipped silently, for any chain of garbage names.
    #[test]
    fn prop_unknown_names_never_change_the_frame(frame in arb_frame(2, 2), garbage in "[a-zA-Z]{1,12}") {
        let catalog = Catalog::with_default_effects();
        prop_assume!(catalog.get(&garbage).is_none());
        let out = apply_chain(&frame, &[garbage], &catalog);
        prop_assert_eq!(out, frame);
    }
}
