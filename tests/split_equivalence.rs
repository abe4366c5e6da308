use pim_polyoffload::{
    generate_operands, OffloadConfig, OffloadController, OpMode, PolyParams, RunContext,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_split_matches_single_pass(
        n in 0usize..3000,
        units in 1usize..40,
        workers in 1usize..9,
        block_size in 1usize..80,
        seed in any::<u64>(),
        mul in any::<bool>(),
    ) {
        let mode = if mul { OpMode::Mul } else { OpMode::Add };
        let params = PolyParams::new(n, 65537).unwrap();
        let (a, b) = generate_operands(params, seed);
        let config = OffloadConfig {
            n,
            units,
            workers,
            block_size,
            unit_capacity: 3000,
            seed,
            mode,
            ..OffloadConfig::default()
        };
        let mut controller = OffloadController::local(config).unwrap();
        let mut ctx = RunContext::acquire(None);
        let offloaded = controller.offload(&a, &b, mode, &mut ctx).unwrap();

        prop_assert!(offloaded.table.tiles_exactly());
        prop_assert_eq!(offloaded.merged, a.apply(&b, mode).unwrap());
    }
}
