use crate::error::ServiceError;

// Starts from `bos`, appends whatever `step` predicts for the sequence so far
// and stops after `eos` or once the sequence (bos included) holds
// `max_length` tokens.
pub fn greedy_decode<F>(
    bos: u32,
    eos: u32,
    max_length: usize,
    mut step: F,
) -> Result<Vec<u32>, ServiceError>
where
    F: FnMut(&[i64]) -> Result<i64, ServiceError>,
{
    let eos = eos as i64;
    let mut input_ids = vec![bos as i64];

    while input_ids.len() < max_length {
        let next = step(&input_ids)?;
        input_ids.push(next);
        if next == eos {
            break;
        }
    }

    input_ids
        .into_iter()
        .map(|id| {
            u32::try_from(id)
                .map_err(|_| ServiceError::Inference(format!("token id {id} out of range")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOS: u32 = 30522;
    const EOS: u32 = 102;

    #[test]
    fn stops_after_end_token() {
        let script = [7, 8, EOS as i64, 9];
        let tokens = greedy_decode(BOS, EOS, 50, |ids| Ok(script[ids.len() - 1])).unwrap();
        assert_eq!(tokens, vec![BOS, 7, 8, EOS]);
    }

    #[test]
    fn length_cap_counts_start_token() {
        let mut calls = 0;
        let tokens = greedy_decode(BOS, EOS, 5, |_| {
            calls += 1;
            Ok(42)
        })
        .unwrap();
        assert_eq!(tokens, vec![BOS, 42, 42, 42, 42]);
        assert_eq!(calls, 4);
    }

    #[test]
    fn length_one_yields_only_start_token() {
        let tokens = greedy_decode(BOS, EOS, 1, |_| panic!("no step expected")).unwrap();
        assert_eq!(tokens, vec![BOS]);
    }

    #[test]
    fn step_sees_growing_prefix() {
        let mut seen = Vec::new();
        greedy_decode(BOS, EOS, 4, |ids| {
            seen.push(ids.to_vec());
            Ok(ids.len() as i64)
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![
                vec![BOS as i64],
                vec![BOS as i64, 1],
                vec![BOS as i64, 1, 2],
            ]
        );
    }

    #[test]
    fn step_errors_propagate() {
        let err = greedy_decode(BOS, EOS, 10, |ids| {
            if ids.len() < 3 {
                Ok(5)
            } else {
                Err(ServiceError::Inference("decoder exploded".into()))
            }
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::Inference(ref msg) if msg == "decoder exploded"));
    }

    #[test]
    fn negative_token_is_an_inference_error() {
        let err = greedy_decode(BOS, EOS, 3, |_| Ok(-1)).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));
    }
}
