use super::allocator::Arena;
use super::lattice::{FeatureSpace, Lattice};

/// A training sentence after feature extraction: only gold label indices
/// and the location of its feature lists remain.
#[derive(Debug, Clone)]
pub struct TrainingSentence {
    answers: Vec<usize>,
    feature_id: usize,
    thread_id: usize,
}

impl TrainingSentence {
    pub fn new(answers: Vec<usize>, feature_id: usize, thread_id: usize) -> Self {
        Self {
            answers,
            feature_id,
            thread_id,
        }
    }

    /// Gold label index of every token
    pub fn answers(&self) -> &[usize] {
        &self.answers
    }

    /// First feature cache entry of the sentence
    pub fn feature_id(&self) -> usize {
        self.feature_id
    }

    /// Worker the sentence is assigned to
    pub fn thread_id(&self) -> usize {
        self.thread_id
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

/// Runs one sentence's lattice against the current weights.
#[derive(Debug)]
pub struct SentenceProcessor<'a> {
    sentence: &'a TrainingSentence,
    arena: &'a mut Arena,
    space: FeatureSpace<'a>,
    weights: &'a [f64],
    result: Vec<usize>,
}

impl<'a> SentenceProcessor<'a> {
    pub fn new(
        sentence: &'a TrainingSentence,
        arena: &'a mut Arena,
        space: FeatureSpace<'a>,
        weights: &'a [f64],
    ) -> Self {
        Self {
            sentence,
            arena,
            space,
            weights,
            result: Vec::with_capacity(sentence.len()),
        }
    }

    /// Labels of the last Viterbi pass
    pub fn result(&self) -> &[usize] {
        &self.result
    }

    /// Add the model expectation minus the gold counts to `expected` and
    /// return the negative log-likelihood of the gold sequence.
    pub fn gradient(&mut self, expected: &mut [f64]) -> f64 {
        if self.sentence.is_empty() {
            return 0.0;
        }
        let mut lattice = Lattice::build(
            &mut *self.arena,
            self.space,
            self.sentence.feature_id,
            self.sentence.len(),
            self.weights,
        );
        let z = lattice.forward_backward();
        lattice.calc_expectation(expected, z);
        let gold = accumulate(&lattice, &self.sentence.answers, expected, -1.0);
        lattice.viterbi(&mut self.result);
        z - gold
    }

    /// Perceptron-style update direction: +1 for gold features, -1 for the
    /// Viterbi prediction's features.
    ///
    /// Returns the negated score margin of gold over prediction, or 0 without
    /// touching `expected` when the prediction is already correct.
    pub fn collins(&mut self, expected: &mut [f64]) -> f64 {
        if self.sentence.is_empty() {
            self.result.clear();
            return 0.0;
        }
        let mut lattice = Lattice::build(
            &mut *self.arena,
            self.space,
            self.sentence.feature_id,
            self.sentence.len(),
            self.weights,
        );
        lattice.viterbi(&mut self.result);
        if self.result == self.sentence.answers {
            return 0.0;
        }
        let gold = accumulate(&lattice, &self.sentence.answers, expected, 1.0);
        let predicted = accumulate(&lattice, &self.result, expected, -1.0);
        -(gold - predicted)
    }

    /// Number of tokens the last Viterbi pass got wrong
    pub fn eval(&self) -> usize {
        self.result
            .iter()
            .zip(&self.sentence.answers)
            .filter(|(y, answer)| y != answer)
            .count()
    }
}

/// Add `sign` at every feature index of the label sequence `labels` and
/// return the sequence's score.
fn accumulate(lattice: &Lattice<'_>, labels: &[usize], out: &mut [f64], sign: f64) -> f64 {
    let mut score = 0.0;
    for (x, &y) in labels.iter().enumerate() {
        let node = lattice.node(x, y);
        for &f in lattice.features(node.fvector) {
            out[f as usize + y] += sign;
        }
        score += node.cost;

        if x == 0 {
            continue;
        }
        if let Some(path) = lattice.path_between(x, labels[x - 1], y) {
            let offset = lattice.path_offset(path);
            for &f in lattice.features(path.fvector) {
                out[f as usize + offset] += sign;
            }
            score += path.cost;
        }
    }
    score
}
