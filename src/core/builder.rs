use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broadcast::broadcaster::Broadcaster;
use crate::broadcast::delivery::DeliveredBroadcast;
use crate::config::Configuration;
use crate::core::manager::{RbcHandle, RbcManager};
use crate::core::shutdown::Shutdown;
use crate::core::RbcError;
use crate::network::{NetReceiver, Transport};
use crate::peer::PeerId;

/// Wires configuration, transport and channels into a manager/handle pair.
///
/// The returned manager must be driven with [`RbcManager::run`]; the handle
/// is the public face of the node's broadcast capability.
pub struct RbcBuilder {
    configuration: Configuration,
}

impl RbcBuilder {
    pub fn new(configuration: Configuration) -> RbcBuilder {
        RbcBuilder { configuration }
    }

    pub fn build(
        self,
        transport: Arc<dyn Transport>,
        from_network: NetReceiver,
        shutdown: Shutdown,
    ) -> Result<(RbcManager, RbcHandle), RbcError> {
        let broadcast_config = self.configuration.broadcast;
        if broadcast_config.cluster_size == 0 {
            return Err(RbcError::InvalidConfiguration(
                "cluster size must be at least 1".to_string(),
            ));
        }

        let peer_id = PeerId::new(self.configuration.node.id);
        let (command_tx, command_rcv) = mpsc::channel(broadcast_config.channel_buffer);
        let delivered = DeliveredBroadcast::new(broadcast_config.channel_buffer);
        let broadcaster = Broadcaster::new(peer_id.clone(), broadcast_config.cluster_size);

        let handle = RbcManager::handle(command_tx, delivered.clone());
        let manager = RbcManager::new(
            peer_id,
            broadcast_config,
            broadcaster,
            from_network,
            command_rcv,
            transport,
            delivered,
            shutdown,
        );

        Ok((manager, handle))
    }
}
