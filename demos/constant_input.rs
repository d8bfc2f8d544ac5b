// Constant-input prediction demo using OgmaNeo sparse predictive hierarchies
//
// Builds a 4x4 input with two 36x36 chunked layers above it, feeds the same
// field every step and reports how far the prediction is from the input.
//
// Run with: RUST_LOG=ogmaneo=debug cargo run --release --example constant_input

use std::sync::Arc;

use ogmaneo::architect::{Architect, SparseFeaturesType};
use ogmaneo::compute::{ComputeSystem, DeviceType};
use ogmaneo::helpers::Int2;
use ogmaneo::value_field::ValueField2D;

const INPUT_SIZE: Int2 = Int2 { x: 4, y: 4 };
const NUM_STEPS: usize = 500;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ogmaneo=info".parse()?),
        )
        .init();

    let cs = Arc::new(ComputeSystem::new(DeviceType::Cpu, 0)?);
    tracing::info!(threads = cs.num_threads(), "compute system ready");

    let mut arch = Architect::new(1234, cs);

    arch.add_input_layer(INPUT_SIZE)
        .set_value("in_p_alpha", 0.02)?
        .set_value("in_p_radius", 8)?;

    for _ in 0..2 {
        arch.add_higher_layer(Int2::new(36, 36), SparseFeaturesType::Chunk)
            .set_value("chunk_size", Int2::new(6, 6))?;
    }

    let mut h = arch.generate_hierarchy()?;

    let mut input = ValueField2D::new(INPUT_SIZE);
    for x in 0..INPUT_SIZE.x {
        for y in 0..INPUT_SIZE.y {
            input.set_value(Int2::new(x, y), (y * INPUT_SIZE.x + x) as f32)?;
        }
    }

    for step in 1..=NUM_STEPS {
        h.sim_step(std::slice::from_ref(&input), true)?;

        if step % 100 == 0 {
            let prediction = &h.get_predictions()[0];
            let error: f32 = prediction
                .data()
                .iter()
                .zip(input.data())
                .map(|(p, x)| (p - x).abs())
                .sum::<f32>()
                / input.data().len() as f32;

            tracing::info!(step, error, "prediction error");
        }
    }

    let prediction = &h.get_predictions()[0];
    for y in 0..INPUT_SIZE.y {
        let row: Vec<String> = (0..INPUT_SIZE.x)
            .map(|x| {
                prediction
                    .get_value(Int2::new(x, y))
                    .map(|v| format!("{v:6.2}"))
                    .unwrap_or_default()
            })
            .collect();
        println!("{}", row.join(" "));
    }

    Ok(())
}
