use coherent::{
    BottomUp, Erm, ErmMethod, HierarchyTree, MiddleOut, MinTrace, MinTraceMethod,
    ReconcileInput, Reconciler, Regularization, TopDown, TopDownMethod,
};
use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> coherent::Result<()> {
    // RUST_LOG=coherent=debug shows each strategy's decisions.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 1. Country → 2 regions → 4 stores.
    let tree = HierarchyTree::from_parents(&[
        None,
        Some(0),
        Some(0),
        Some(1),
        Some(1),
        Some(2),
        Some(2),
    ])?;
    let s = tree.summing_matrix();
    let levels = tree.levels_named(&["country", "region", "store"])?;

    // 2. Synthetic sales history: coherent actuals, noisy fitted values.
    let mut rng = StdRng::seed_from_u64(7);
    let history = 24;
    let stores = Mat::from_fn(tree.num_leaves(), history, |j, t| {
        20.0 + 5.0 * j as f64 + 3.0 * (t as f64 / 4.0).sin() + rng.gen_range(-1.0..1.0)
    });
    let y_insample = s.as_ref() * stores.as_ref();
    let y_fitted = Mat::from_fn(7, history, |i, t| y_insample[(i, t)] * rng.gen_range(0.9..1.1));

    // 3. Base forecasts for the next 3 steps, made independently per series.
    let y_hat = Mat::from_fn(7, 3, |i, h| {
        y_insample[(i, history - 1)] * (1.0 + 0.02 * h as f64) + rng.gen_range(-4.0..4.0)
    });

    let input = ReconcileInput::new(y_hat.as_ref())
        .with_levels(&levels)
        .with_bottom(tree.leaves())
        .with_insample(y_insample.as_ref(), y_fitted.as_ref());

    let strategies: Vec<Box<dyn Reconciler>> = vec![
        Box::new(BottomUp::new()),
        Box::new(TopDown::new(TopDownMethod::ProportionAverages)),
        Box::new(MiddleOut::new("region", TopDownMethod::ForecastProportions)),
        Box::new(MinTrace::new(MinTraceMethod::MintShrink)),
        Box::new(Erm::new(ErmMethod::RegBu {
            lambda: Regularization::Fixed(1e-2),
        })),
    ];

    println!(
        "base      total={:8.2} regions={:8.2} stores={:8.2}",
        y_hat[(0, 0)],
        y_hat[(1, 0)] + y_hat[(2, 0)],
        (3..7).map(|i| y_hat[(i, 0)]).sum::<f64>()
    );
    // 4. Reconcile with each strategy and check the first step adds up.
    for strategy in &strategies {
        let y_tilde = strategy.reconcile(&s, &input)?;
        println!(
            "{:<12} total={:8.2} regions={:8.2} stores={:8.2}",
            strategy.name(),
            y_tilde[(0, 0)],
            y_tilde[(1, 0)] + y_tilde[(2, 0)],
            tree.leaves().iter().map(|b| y_tilde[(b.index(), 0)]).sum::<f64>()
        );
    }
    Ok(())
}
