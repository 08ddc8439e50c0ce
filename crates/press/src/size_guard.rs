//! Size-regression guard.
//!
//! Post-transform check ensuring a quality level never delivers an output
//! that is not smaller than the input. When the engine fails to shrink the
//! document, the original input stands in as the effective result.

use std::sync::Arc;

/// Verdict of the size-regression guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeVerdict {
    /// Engine output is smaller than the input and is used as-is.
    Reduced {
        input_bytes: u64,
        output_bytes: u64,
    },
    /// Engine output was not smaller; the original input is substituted.
    KeptOriginal {
        input_bytes: u64,
        output_bytes: u64,
    },
}

impl SizeVerdict {
    /// Size of the effective result after the guard.
    pub fn effective_bytes(&self) -> u64 {
        match self {
            SizeVerdict::Reduced { output_bytes, .. } => *output_bytes,
            SizeVerdict::KeptOriginal { input_bytes, .. } => *input_bytes,
        }
    }
}

/// Apply the size-regression guard to an engine output.
///
/// Returns the effective payload for the quality level and the verdict.
/// The output is used only if `output.len() < input.len()`; otherwise the
/// input is returned unchanged (sharing the existing allocation).
pub fn apply(input: &Arc<Vec<u8>>, output: Vec<u8>) -> (Arc<Vec<u8>>, SizeVerdict) {
    let input_bytes = input.len() as u64;
    let output_bytes = output.len() as u64;

    if output_bytes < input_bytes {
        (
            Arc::new(output),
            SizeVerdict::Reduced {
                input_bytes,
                output_bytes,
            },
        )
    } else {
        (
            Arc::clone(input),
            SizeVerdict::KeptOriginal {
                input_bytes,
                output_bytes,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_effective_result_never_exceeds_input(
            input_len in 1usize..4096,
            output_len in 0usize..8192,
        ) {
            let input = Arc::new(vec![0xAAu8; input_len]);
            let output = vec![0xBBu8; output_len];

            let (payload, verdict) = apply(&input, output);

            prop_assert!(payload.len() <= input_len,
                "effective payload ({}) larger than input ({})",
                payload.len(), input_len);

            match verdict {
                SizeVerdict::Reduced { input_bytes, output_bytes } => {
                    prop_assert!(output_len < input_len);
                    prop_assert_eq!(input_bytes, input_len as u64);
                    prop_assert_eq!(output_bytes, output_len as u64);
                    prop_assert_eq!(payload.len(), output_len);
                }
                SizeVerdict::KeptOriginal { input_bytes, output_bytes } => {
                    prop_assert!(output_len >= input_len);
                    prop_assert_eq!(input_bytes, input_len as u64);
                    prop_assert_eq!(output_bytes, output_len as u64);
                    prop_assert_eq!(payload.len(), input_len);
                }
            }

            prop_assert_eq!(verdict.effective_bytes(), payload.len() as u64);
        }
    }

    #[test]
    fn test_larger_output_substitutes_original() {
        let input = Arc::new(vec![1u8; 1000]);
        let output = vec![2u8; 1200];

        let (payload, verdict) = apply(&input, output);

        assert!(Arc::ptr_eq(&payload, &input));
        assert_eq!(
            verdict,
            SizeVerdict::KeptOriginal {
                input_bytes: 1000,
                output_bytes: 1200
            }
        );
    }

    #[test]
    fn test_equal_size_substitutes_original() {
        let input = Arc::new(vec![1u8; 500]);
        let output = vec![2u8; 500];

        let (payload, _) = apply(&input, output);
        assert!(Arc::ptr_eq(&payload, &input));
    }

    #[test]
    fn test_smaller_output_is_kept() {
        let input = Arc::new(vec![1u8; 1000]);
        let output = vec![2u8; 400];

        let (payload, verdict) = apply(&input, output.clone());

        assert_eq!(*payload, output);
        assert_eq!(
            verdict,
            SizeVerdict::Reduced {
                input_bytes: 1000,
                output_bytes: 400
            }
        );
    }
}
