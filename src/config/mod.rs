use std::path::Path;

use serde_derive::Deserialize;

//protocol settings
pub const DEFAULT_CLUSTER_SIZE: usize = 1;
pub const DEFAULT_PAYLOAD_MAX_BYTES: usize = 1024 * 1024;
pub const DEFAULT_CHANNEL_BUFFER: usize = 1000;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub node: NodeConfig,
    pub broadcast: BroadcastConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Identity of this node inside the broadcast group.
    pub id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Number of peers participating in a broadcast group.
    #[serde(default = "default_cluster_size")]
    pub cluster_size: usize,
    /// Upper bound on a single broadcast payload.
    #[serde(default = "default_payload_max_bytes")]
    pub payload_max_bytes: usize,
    /// Buffer size of the internal protocol message channels.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_cluster_size() -> usize {
    DEFAULT_CLUSTER_SIZE
}

fn default_payload_max_bytes() -> usize {
    DEFAULT_PAYLOAD_MAX_BYTES
}

fn default_channel_buffer() -> usize {
    DEFAULT_CHANNEL_BUFFER
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(file: P) -> anyhow::Result<Configuration> {
        let config = config::Config::builder()
            .add_source(config::File::from(file.as_ref()))
            .build()?;

        let configuration: Configuration = config.try_deserialize()?;
        Ok(configuration)
    }

    pub fn new(node_id: &str, cluster_size: usize) -> Configuration {
        Configuration {
            node: NodeConfig {
                id: node_id.to_string(),
            },
            broadcast: BroadcastConfig {
                cluster_size,
                payload_max_bytes: DEFAULT_PAYLOAD_MAX_BYTES,
                channel_buffer: DEFAULT_CHANNEL_BUFFER,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let dir = std::env::temp_dir().join(format!("bracha-rbc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("node.toml");
        std::fs::write(
            &file,
            r#"
            [node]
            id = "node1"

            [broadcast]
            cluster_size = 7
            "#,
        )
        .unwrap();

        let configuration = Configuration::load(&file).unwrap();
        assert_eq!(configuration.node.id, "node1");
        assert_eq!(configuration.broadcast.cluster_size, 7);
        assert_eq!(
            configuration.broadcast.payload_max_bytes,
            DEFAULT_PAYLOAD_MAX_BYTES
        );
        assert_eq!(configuration.broadcast.channel_buffer, DEFAULT_CHANNEL_BUFFER);
    }
}
