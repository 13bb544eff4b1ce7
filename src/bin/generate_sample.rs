use std::path::PathBuf;

use event_grid::data::{batch_path, write_batch, Batch, FieldArray, LoadMode};
use event_grid::RunConfig;
use ndarray::{Array1, Array4};

const IMAGE_SIZE: usize = 28;
const EVENTS_PER_BATCH: [usize; 5] = [64, 64, 64, 64, 32];

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// One shower-like deposit: a 2-D gaussian blob with a random centre,
/// width and energy, returned with its class (narrow vs. wide shower).
fn generate_event(rng: &mut SimpleRng) -> (Vec<f64>, i64, f64) {
    let cx = rng.uniform(8.0, 20.0);
    let cy = rng.uniform(8.0, 20.0);
    let wide = rng.next_f64() < 0.5;
    let sigma = if wide { rng.uniform(3.0, 5.0) } else { rng.uniform(1.0, 2.0) };
    let energy = rng.uniform(1.0, 100.0);

    let mut pixels = Vec::with_capacity(IMAGE_SIZE * IMAGE_SIZE);
    for y in 0..IMAGE_SIZE {
        for x in 0..IMAGE_SIZE {
            let value = gaussian(x as f64, cx, sigma, 1.0) * gaussian(y as f64, cy, sigma, energy);
            pixels.push(value + 0.01 * rng.next_f64());
        }
    }
    (pixels, i64::from(wide), energy)
}

fn main() {
    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_batches"));
    std::fs::create_dir_all(&out_dir).expect("Failed to create output directory");

    let mut rng = SimpleRng::new(42);
    let mut total = 0;

    for (index, &events) in EVENTS_PER_BATCH.iter().enumerate() {
        let mut pixels = Vec::with_capacity(events * IMAGE_SIZE * IMAGE_SIZE);
        let mut labels = Vec::with_capacity(events);
        let mut energies = Vec::with_capacity(events);
        for _ in 0..events {
            let (image, label, energy) = generate_event(&mut rng);
            pixels.extend(image);
            labels.push(label);
            energies.push(energy);
        }

        let x = Array4::from_shape_vec((events, IMAGE_SIZE, IMAGE_SIZE, 1), pixels)
            .expect("pixel count matches shape");
        let batch: Batch = [
            ("x", FieldArray::Float(x.into_dyn())),
            ("y", FieldArray::Int(Array1::from(labels).into_dyn())),
            ("energy", FieldArray::Float(Array1::from(energies).into_dyn())),
        ]
        .into_iter()
        .collect();

        let path = batch_path(&out_dir, index);
        write_batch(&path, &batch).expect("Failed to write batch");
        println!("Wrote {events} events to {}", path.display());
        total += events;
    }

    let config = RunConfig {
        dataset_dir: out_dir.clone(),
        mode: LoadMode::Full,
        preview_field: Some("x".to_string()),
        scale: 1.0,
        save: false,
        output_dir: Some(out_dir.join("plots")),
        epoch: 0,
    };
    let config_path = out_dir.join("sample_config.json");
    let json = serde_json::to_string_pretty(&config).expect("Failed to serialise config");
    std::fs::write(&config_path, json).expect("Failed to write config");

    println!(
        "Wrote {total} events in {} batches; open with `event-grid {}`",
        EVENTS_PER_BATCH.len(),
        config_path.display()
    );
}
