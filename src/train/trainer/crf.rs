use std::cell::Cell;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::super::allocator::Allocator;
use super::super::feature_index::FeatureIndex;
use super::super::tagger::{SentenceProcessor, TrainingSentence};
use super::TrainerParams;
use crate::error::{Error, Result};

/// Per-thread accumulator of one gradient pass
#[derive(Debug)]
struct Worker {
    obj: f64,
    err: usize,
    zeroone: usize,
    expected: Vec<f64>,
}

impl Worker {
    fn new(size: usize) -> Self {
        Self {
            obj: 0.0,
            err: 0,
            zeroone: 0,
            expected: vec![0.0; size],
        }
    }

    fn clear(&mut self) {
        self.obj = 0.0;
        self.err = 0;
        self.zeroone = 0;
        self.expected.fill(0.0);
    }

    fn merge(&mut self, other: &Worker) {
        self.obj += other.obj;
        self.err += other.err;
        self.zeroone += other.zeroone;
        for (a, b) in self.expected.iter_mut().zip(&other.expected) {
            *a += b;
        }
    }
}

/// Statistics of the most recent evaluation, reported once the optimizer
/// accepts the step
#[derive(Debug, Clone, Copy, Default)]
struct EpochStats {
    err: usize,
    zeroone: usize,
    active: usize,
}

/// Tracks the relative objective change between iterations
#[derive(Debug)]
pub(super) struct ConvergenceMonitor {
    eta: f64,
    max_iterations: usize,
    iteration: usize,
    old_obj: f64,
    converge: usize,
}

impl ConvergenceMonitor {
    pub(super) fn new(eta: f64, max_iterations: usize) -> Self {
        Self {
            eta,
            max_iterations,
            iteration: 0,
            old_obj: 0.0,
            converge: 0,
        }
    }

    /// Record the objective of the current iteration.
    ///
    /// Returns the relative change and whether three consecutive iterations
    /// stayed below `eta`.
    pub(super) fn observe(&mut self, obj: f64) -> (f64, bool) {
        let diff = if self.iteration == 0 {
            1.0
        } else {
            (self.old_obj - obj).abs() / self.old_obj
        };
        self.old_obj = obj;
        if diff < self.eta {
            self.converge += 1;
        } else {
            self.converge = 0;
        }
        self.iteration += 1;
        (diff, self.converge == 3)
    }

    /// Whether every allowed iteration has already taken its step
    pub(super) fn exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub(super) fn iteration(&self) -> usize {
        self.iteration
    }
}

/// Add the regularization gradient to `gradient` and return the penalty to
/// report plus the number of active weights.
///
/// With `orthant` set the penalty is `|w| / C` and the gradient is left alone;
/// the orthant-wise optimizer handles the L1 term itself.
fn regularize(weights: &[f64], gradient: &mut [f64], cost: f64, orthant: bool) -> (f64, usize) {
    let mut penalty = 0.0;
    if orthant {
        let mut active = 0;
        for &w in weights {
            penalty += w.abs() / cost;
            if w != 0.0 {
                active += 1;
            }
        }
        (penalty, active)
    } else {
        for (g, &w) in gradient.iter_mut().zip(weights) {
            penalty += w * w / (2.0 * cost);
            *g += w / cost;
        }
        (penalty, weights.len())
    }
}

/// Settings for the quasi-Newton optimizer. `liblbfgs::Lbfgs` is not
/// nameable outside its crate, so the builder is assembled in `minimize`.
struct Optimizer {
    cost: f64,
    orthant: bool,
    num_weights: usize,
}

impl Optimizer {
    fn minimize<E, G>(
        self,
        x: &mut [f64],
        eval_fn: E,
        prgr_fn: G,
    ) -> anyhow::Result<liblbfgs::Report>
    where
        E: FnMut(&[f64], &mut [f64]) -> anyhow::Result<f64>,
        G: FnMut(&liblbfgs::Progress) -> bool,
    {
        let lbfgs = liblbfgs::lbfgs().with_epsilon(0.0);
        if self.orthant {
            lbfgs
                .with_linesearch_algorithm("BacktrackingStrongWolfe")
                .with_orthantwise(1.0 / self.cost, 0, self.num_weights)
                .minimize(x, eval_fn, prgr_fn)
        } else {
            lbfgs.minimize(x, eval_fn, prgr_fn)
        }
    }
}

/// Build the quasi-Newton optimizer. The gradient-norm test is disabled so
/// only the convergence monitor and the iteration cap end training.
fn optimizer(cost: f64, orthant: bool, num_weights: usize) -> Optimizer {
    Optimizer {
        cost,
        orthant,
        num_weights,
    }
}

/// Train a CRF with L-BFGS (L2) or OWL-QN (L1).
pub(super) fn run(
    samples: &[TrainingSentence],
    index: &FeatureIndex,
    allocator: &mut Allocator,
    weights: &mut [f64],
    params: &TrainerParams,
    orthant: bool,
) -> Result<()> {
    if weights.is_empty() {
        warn!("no features to train");
        return Ok(());
    }

    let thread_num = allocator.thread_num();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_num)
        .build()?;
    let (cache, arenas) = allocator.split_mut();
    let space = index.feature_space(cache);
    let num_weights = weights.len();
    let cost = params.cost();
    let all: usize = samples.iter().map(TrainingSentence::len).sum();
    let num_samples = samples.len().max(1);

    let mut workers: Vec<Worker> = (0..thread_num).map(|_| Worker::new(num_weights)).collect();
    let stats = Cell::new(EpochStats::default());
    let mut monitor = ConvergenceMonitor::new(params.eta(), params.max_iterations());

    let evaluate = |x: &[f64], gx: &mut [f64]| -> anyhow::Result<f64> {
        pool.install(|| {
            workers
                .par_iter_mut()
                .zip(arenas.par_iter_mut())
                .enumerate()
                .for_each(|(tid, (worker, arena))| {
                    worker.clear();
                    for sample in samples.iter().skip(tid).step_by(thread_num) {
                        debug_assert_eq!(sample.thread_id(), tid);
                        let mut processor = SentenceProcessor::new(sample, &mut *arena, space, x);
                        worker.obj += processor.gradient(&mut worker.expected);
                        let err = processor.eval();
                        worker.err += err;
                        if err != 0 {
                            worker.zeroone += 1;
                        }
                    }
                });
        });

        let (head, rest) = workers.split_at_mut(1);
        let head = &mut head[0];
        for worker in rest.iter() {
            head.merge(worker);
        }

        let (penalty, active) = regularize(x, &mut head.expected, cost, orthant);
        gx.copy_from_slice(&head.expected);
        stats.set(EpochStats {
            err: head.err,
            zeroone: head.zeroone,
            active,
        });

        let obj = if orthant { head.obj } else { head.obj + penalty };
        anyhow::ensure!(obj.is_finite(), "objective is not finite: {}", obj);
        Ok(obj)
    };

    let progress = |prgr: &liblbfgs::Progress| -> bool {
        // liblbfgs reports the starting point again before its first line search
        if prgr.niter == 1 {
            return false;
        }
        if monitor.exhausted() {
            return true;
        }
        let epoch = stats.get();
        let (diff, converged) = monitor.observe(prgr.fx);
        info!(
            "iter={} terr={:.5} serr={:.5} act={} obj={:.5} diff={:.5}",
            monitor.iteration() - 1,
            epoch.err as f64 / all.max(1) as f64,
            epoch.zeroone as f64 / num_samples as f64,
            epoch.active,
            prgr.fx,
            diff
        );
        converged
    };

    let report = optimizer(cost, orthant, num_weights)
        .minimize(weights, evaluate, progress)
        .map_err(|e| Error::Optimizer(format!("{:#}", e)))?;
    debug!("optimizer finished: fx = {}", report.fx);
    Ok(())
}
