//! Generation of payloads for creates and updates.

use bytes::Bytes;
use rand::RngCore;

use crate::config::PayloadConfig;

/// Produces payloads according to a [`PayloadConfig`].
///
/// Cloning is cheap, the fixed buffer is shared between clones.
#[derive(Clone, Debug)]
pub struct PayloadSource {
    size: usize,
    random: bool,
    fixed: Bytes,
}

impl PayloadSource {
    /// Creates a source for the given configuration.
    pub fn new(config: PayloadConfig) -> Self {
        let size = config.size as usize;
        let fixed = if config.random {
            Bytes::new()
        } else {
            Bytes::from(vec![b'x'; size])
        };

        Self {
            size,
            random: config.random,
            fixed,
        }
    }

    /// Returns the size of every generated payload in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the next payload, filled from `rng` if random payloads are configured.
    pub fn generate(&self, rng: &mut impl RngCore) -> Bytes {
        if !self.random {
            return self.fixed.clone();
        }

        let mut buf = vec![0; self.size];
        rng.fill_bytes(&mut buf);
        buf.into()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn random_payloads_differ() {
        let source = PayloadSource::new(PayloadConfig {
            size: 64,
            random: true,
        });
        let mut rng = SmallRng::seed_from_u64(7);

        let first = source.generate(&mut rng);
        let second = source.generate(&mut rng);
        assert_eq!(first.len(), 64);
        assert_eq!(second.len(), 64);
        assert_ne!(first, second);
    }

    #[test]
    fn fixed_payload_is_reused() {
        let source = PayloadSource::new(PayloadConfig {
            size: 16,
            random: false,
        });
        let mut rng = SmallRng::seed_from_u64(7);

        let first = source.generate(&mut rng);
        assert_eq!(first, Bytes::from(vec![b'x'; 16]));
        // Clones of `Bytes` share the same allocation.
        assert_eq!(first.as_ptr(), source.generate(&mut rng).as_ptr());
    }
}
