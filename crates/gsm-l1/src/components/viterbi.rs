/// Type used to represent input bits.
/// A soft bit is a confidence in [0, 1]: 0.0 is a certain '0', 1.0 a
/// certain '1' and 0.5 carries no information, so a missing burst
/// contributes nothing to the path metrics.
pub type SoftBit = f32;

/// Type used to accumulate path metrics.
type Metric = f32;

/// Constraint length of the code.
/// This is defined as a constant rather than a const generic parameter
/// since it also affects NUM_STATES and the choice of type for
/// DecisionBitmap which would be more complicated to make generic.
const K: usize = 5;

const NUM_STATES: usize = num_states(K);

/// Unsigned integer type used to store decisions for each state in trellis.
/// Each bit represents a decision for a given state,
/// so the number of bits should be at least the number of states.
type DecisionBitmap = u16;

/// Number of states for a given constraint length.
pub const fn num_states(k: usize) -> usize {
    1 << (k - 1)
}

/// Viterbi decoder for a binary convolutional code of rate 1/N.
pub struct ViterbiDecoder<const N: usize> {
    /// Expected encoder outputs for each state for encoder input "0".
    expected_0: [[Metric; NUM_STATES]; N],
}

impl<const N: usize> ViterbiDecoder<N> {
    /// `generator_polynomials[n]` lists the taps of polynomial n as
    /// [current input, D^1, D^2, D^3, D^4]. The D^4 (oldest) tap must be
    /// present in every polynomial: the decoder exploits that the expected
    /// outputs for the two predecessor branches are inverses.
    pub fn new_with_polynomials(generator_polynomials: &[[bool; K]; N]) -> Self {
        let expected_0 = std::array::from_fn(|poly_n| {
            let poly = generator_polynomials[poly_n];
            assert!(poly[K - 1], "oldest-delay tap must be present");
            std::array::from_fn(|state| {
                let mut encoder_output: bool = false;
                // Each bit of the state number corresponds to the input
                // consumed at that trellis step followed by the more
                // recent past inputs of the encoder.
                for bit_i in 0..K - 1 {
                    let past_input_bit = (state & (1 << (K - 2 - bit_i))) != 0;
                    if past_input_bit && poly[bit_i] {
                        encoder_output = !encoder_output;
                    }
                }
                if encoder_output { 1.0 } else { -1.0 }
            })
        });
        Self { expected_0 }
    }

    pub fn decode(&self, received_bits: &[SoftBit]) -> Vec<u8> {
        let num_output_bits = received_bits.len() / N;
        let mut trellis_decisions: Vec<DecisionBitmap> = Vec::with_capacity(num_output_bits);

        // Accumulated path metrics for each state.
        //
        // Encoder starts from state 0. Give that an initial metric of 0 and
        // a very high initial value for the other states so they will not
        // be chosen.
        let mut metrics: [Metric; NUM_STATES] = [1e9; NUM_STATES];
        metrics[0] = 0.0;

        for received_bits_for_one_output_bit in received_bits.chunks_exact(N) {
            // Branch metrics for the even-predecessor branch.
            let mut branch_metrics_0: [Metric; NUM_STATES] = [0.0; NUM_STATES];

            // Loop through each generator polynomial and add to branch metrics
            for (received_bit, expected_0) in
                received_bits_for_one_output_bit.iter().zip(self.expected_0.iter())
            {
                // Map confidence [0,1] to bipolar [-1,1]; 0.5 becomes 0.
                let bipolar = 2.0 * received_bit - 1.0;
                // Loop through each state
                for (branch_metric_0, expected_bit_0) in
                    branch_metrics_0.iter_mut().zip(expected_0.iter())
                {
                    *branch_metric_0 -= bipolar * expected_bit_0;
                }
            }

            let mut decisions: DecisionBitmap = 0;

            // New path metrics.
            metrics = std::array::from_fn(|state| {
                // Predecessor state whose oldest delayed bit was 0.
                let predecessor_0 = (state * 2) % NUM_STATES;
                // Predecessor state whose oldest delayed bit was 1.
                let predecessor_1 = predecessor_0 + 1;
                // Candidates for new path metrics.
                let metric_0 = metrics[predecessor_0] + branch_metrics_0[state];
                // With the oldest-delay tap present in every polynomial the
                // expected outputs of the odd predecessor are the inverse
                // of those of the even one, so its branch metric is the
                // negated one.
                let metric_1 = metrics[predecessor_1] - branch_metrics_0[state];

                if metric_1 < metric_0 {
                    // We only need to store the decision as a single bit
                    // rather than the whole predecessor state number,
                    // since each state only has two possible predecessors.
                    decisions |= 1 << state;
                    metric_1
                } else {
                    metric_0
                }
            });
            trellis_decisions.push(decisions);
        }

        // Traceback

        // Tail bits should ensure the final state of the encoder is 0.
        let mut best_state = 0;

        let mut decoded_bits: Vec<u8> = Vec::with_capacity(num_output_bits);
        for decisions in trellis_decisions.iter().rev() {
            decoded_bits.push(((best_state >> (K - 2)) & 1) as u8);
            best_state = best_state * 2 % NUM_STATES + ((*decisions >> best_state) & 1) as usize;
        }
        decoded_bits.reverse();
        decoded_bits
    }
}

/// Decoder for the GSM 05.03 4.1.3 rate-1/2 code.
pub type GsmViterbiDecoder = ViterbiDecoder<2>;

impl Default for GsmViterbiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl GsmViterbiDecoder {
    pub fn new() -> Self {
        Self::new_with_polynomials(&[
            // G0 = 1 + D^3 + D^4
            [true, false, false, true, true],
            // G1 = 1 + D + D^3 + D^4
            [true, true, false, true, true],
        ])
    }
}
