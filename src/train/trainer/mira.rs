use log::info;

use super::super::allocator::Allocator;
use super::super::feature_index::FeatureIndex;
use super::super::tagger::{SentenceProcessor, TrainingSentence};
use super::TrainerParams;
use crate::error::Result;

const MIN_STEP: f64 = 1e-10;

/// Per-sentence dual state of 1-best MIRA
#[derive(Debug)]
struct MiraState {
    cost: f64,
    upper_bound: Vec<f64>,
    shrink: Vec<usize>,
}

/// Outcome of the step size computation for one sentence
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    /// Unconstrained step; `violation` is the KKT violation it repairs
    Free { mu: f64, violation: f64 },
    /// Step cut short by the upper bound C
    Clipped { mu: f64 },
}

impl MiraState {
    fn new(size: usize, cost: f64) -> Self {
        Self {
            cost,
            upper_bound: vec![0.0; size],
            shrink: vec![0; size],
        }
    }

    /// Step size for sentence `i` given its loss (`error - cost_diff`) and the
    /// squared norm of its update direction. `None` when the direction is zero.
    fn step(&self, i: usize, loss: f64, norm: f64) -> Option<Step> {
        if norm <= 0.0 {
            return None;
        }
        let mu = (loss / norm).max(0.0);
        if self.upper_bound[i] + mu > self.cost {
            Some(Step::Clipped {
                mu: self.cost - self.upper_bound[i],
            })
        } else {
            Some(Step::Free {
                mu,
                violation: loss,
            })
        }
    }

    /// Spend `mu` of sentence `i`'s upper bound; returns whether the step is large
    /// enough to apply.
    fn commit(&mut self, i: usize, mu: f64) -> bool {
        if mu <= MIN_STEP {
            return false;
        }
        self.upper_bound[i] = (self.upper_bound[i] + mu).min(self.cost);
        true
    }
}

/// Train with 1-best MIRA. Single-threaded.
pub(super) fn run(
    samples: &[TrainingSentence],
    index: &FeatureIndex,
    allocator: &mut Allocator,
    weights: &mut [f64],
    params: &TrainerParams,
) -> Result<()> {
    let (cache, arenas) = allocator.split_mut();
    let arena = &mut arenas[0];
    let space = index.feature_space(cache);
    let shrinking_size = params.shrinking_size();
    let all: usize = samples.iter().map(TrainingSentence::len).sum();

    let mut state = MiraState::new(samples.len(), params.cost());
    let mut expected = vec![0.0; weights.len()];
    let mut converge = 0;

    for itr in 0..params.max_iterations() {
        let mut err = 0;
        let mut zeroone = 0;
        let mut active = 0;
        let mut upper_active = 0;
        let mut max_kkt = 0.0f64;

        for (i, sample) in samples.iter().enumerate() {
            if state.shrink[i] >= shrinking_size {
                continue;
            }
            active += 1;
            expected.fill(0.0);

            let mut processor = SentenceProcessor::new(sample, &mut *arena, space, weights);
            let cost_diff = processor.collins(&mut expected);
            let error = processor.eval();
            err += error;

            if error == 0 {
                state.shrink[i] += 1;
                continue;
            }
            zeroone += 1;
            state.shrink[i] = 0;

            let norm: f64 = expected.iter().map(|g| g * g).sum();
            let mu = match state.step(i, error as f64 - cost_diff, norm) {
                Some(Step::Free { mu, violation }) => {
                    max_kkt = max_kkt.max(violation);
                    mu
                }
                Some(Step::Clipped { mu }) => {
                    upper_active += 1;
                    mu
                }
                None => continue,
            };
            if state.commit(i, mu) {
                for (w, g) in weights.iter_mut().zip(&expected) {
                    *w += mu * g;
                }
            }
        }

        let obj: f64 = weights.iter().map(|w| w * w).sum();
        info!(
            "iter={} terr={:.5} serr={:.5} act={} uact={} obj={:.5} kkt={:.5}",
            itr,
            err as f64 / all.max(1) as f64,
            zeroone as f64 / samples.len().max(1) as f64,
            active,
            upper_active,
            obj,
            max_kkt
        );

        if max_kkt <= 0.0 {
            state.shrink.fill(0);
            converge += 1;
        } else {
            converge = 0;
        }
        if converge == 2 {
            break;
        }
    }

    Ok(())
}
