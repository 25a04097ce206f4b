use std::sync::Arc;

use perfstore_engine::Connections;
use perfstore_engine::backend::{InMemoryBackend, LocalFsBackend, S3CompatibleConfig};
use secrecy::{ExposeSecret, SecretBox};

use crate::config::{ConfigSecret, S3Storage, Storage};

/// Maps the configured storage to the connection mode of its backend.
///
/// This does not open any connection yet.
pub fn connections(storage: &Storage) -> Connections {
    match storage {
        Storage::Memory => Connections::Shared(Arc::new(InMemoryBackend::new())),
        Storage::FileSystem { path } => Connections::Shared(Arc::new(LocalFsBackend::new(path))),
        Storage::S3Compatible(s3) => Connections::PerWorker(Arc::new(map_s3_config(s3))),
    }
}

fn map_s3_config(config: &S3Storage) -> S3CompatibleConfig {
    S3CompatibleConfig {
        endpoint: config.endpoint.clone(),
        bucket: config.bucket.clone(),
        region: config.region.clone(),
        access_key: expose(config.access_key.as_ref()),
        secret_key: expose(config.secret_key.as_ref()),
        path_style: config.path_style,
        request_timeout: config.request_timeout,
        prefix: config.prefix.clone(),
    }
}

fn expose(secret: Option<&SecretBox<ConfigSecret>>) -> Option<String> {
    secret.map(|secret| secret.expose_secret().as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_shared() {
        let Connections::Shared(backend) = connections(&Storage::Memory) else {
            panic!("expected a shared backend");
        };
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn s3_is_per_worker() {
        let storage = Storage::S3Compatible(S3Storage {
            bucket: "bench".into(),
            ..Default::default()
        });
        assert!(matches!(connections(&storage), Connections::PerWorker(_)));
    }

    #[test]
    fn s3_credentials_pass_through() {
        let storage = S3Storage {
            access_key: Some(SecretBox::new(Box::new("minio".into()))),
            ..Default::default()
        };

        let config = map_s3_config(&storage);
        assert_eq!(config.access_key.as_deref(), Some("minio"));
        assert_eq!(config.secret_key, None);
        assert_eq!(config.bucket, "perf");
    }
}
