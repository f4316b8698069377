//! Group: master/slave multiroom aggregation (spec §4.8).
//!
//! Grounded on `pmocontrol::music_renderer::musicrenderer::MusicRenderer`'s
//! treatment of a renderer's `TransportState` as the union of its own state
//! and whatever a linked renderer reports, generalized here into an
//! explicit `Group` type that owns the master/slave role machine instead of
//! leaving it implicit in renderer-to-renderer links.

use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{ControlError, Result};
use crate::model::Role;
use crate::player::Player;

/// One multiroom group: exactly one master, zero or more slaves. A
/// solo `Player` that has never joined or hosted a group has no `Group`.
pub struct Group {
    master: Arc<Player>,
    slaves: Vec<Arc<Player>>,
}

impl Group {
    pub fn new(master: Arc<Player>) -> Self {
        Group {
            master,
            slaves: Vec::new(),
        }
    }

    pub fn master(&self) -> &Arc<Player> {
        &self.master
    }

    pub fn slaves(&self) -> &[Arc<Player>] {
        &self.slaves
    }

    fn host_of(player: &Player) -> String {
        player.identity.host.clone()
    }

    /// Adds `device` as a slave of this group's master, issuing the wire
    /// `JoinSlave` command on the master (spec §6: `multiroom:JoinGroupMaster:<ip>`
    /// is issued by the slave against itself, pointing at the master — see
    /// DESIGN.md for which side actually owns the HTTP call).
    ///
    /// Idempotent (spec §4.8 and §8 scenario 5): joining a device that is
    /// already a slave of a *different* master first leaves that group;
    /// joining a device that is already this group's slave is a no-op.
    /// Joining a device that is itself hosting its own group (i.e. is a
    /// master with its own slaves) demotes it, and its former slaves follow
    /// it into the new group as the new group's slaves as well.
    pub async fn join(&mut self, device: Arc<Player>, other_group: Option<&mut Group>) -> Result<()> {
        if Arc::ptr_eq(&device, &self.master) {
            return Err(ControlError::precondition("a device cannot join a group it masters"));
        }
        if self.slaves.iter().any(|s| Arc::ptr_eq(s, &device)) {
            return Ok(());
        }

        let mut incoming = vec![device.clone()];
        if let Some(group) = other_group {
            if Arc::ptr_eq(group.master(), &device) {
                incoming.extend(group.slaves.drain(..));
            } else {
                group.leave(device.clone()).await?;
            }
        }

        device
            .transport_issue_join(&Self::host_of(&self.master))
            .await?;
        for follower in &incoming[1..] {
            follower.transport_issue_join(&Self::host_of(&self.master)).await?;
        }

        self.slaves.extend(incoming);
        self.set_member_masters().await;
        self.notify_all().await;
        Ok(())
    }

    /// Removes `device` from this group. A no-op if it is not currently a
    /// slave here (idempotent per spec §4.8). Leaving the last slave does
    /// not dissolve the group object; callers decide whether an
    /// empty-of-slaves `Group` should be dropped.
    pub async fn leave(&mut self, device: Arc<Player>) -> Result<()> {
        let before = self.slaves.len();
        self.slaves.retain(|s| !Arc::ptr_eq(s, &device));
        if self.slaves.len() == before {
            return Ok(());
        }
        device.transport_issue_leave().await?;
        device.set_group_master(None).await;
        self.notify_all().await;
        Ok(())
    }

    /// Forcibly removes a slave from the master's side (spec §6
    /// `multiroom:SlaveKickout:<ip>`).
    pub async fn kick(&mut self, device: Arc<Player>) -> Result<()> {
        let before = self.slaves.len();
        self.slaves.retain(|s| !Arc::ptr_eq(s, &device));
        if self.slaves.len() == before {
            return Ok(());
        }
        self.master.transport_issue_kick(&Self::host_of(&device)).await?;
        device.set_group_master(None).await;
        self.notify_all().await;
        Ok(())
    }

    /// Aggregate volume: the loudest member (spec §4.8 "volume=max").
    pub async fn aggregate_volume(&self) -> f32 {
        let mut max = self.master.status().await.volume;
        for slave in &self.slaves {
            max = max.max(slave.status().await.volume);
        }
        max
    }

    /// Aggregate mute: muted only if every member is muted (spec §4.8
    /// "muted=all").
    pub async fn aggregate_muted(&self) -> bool {
        if !self.master.status().await.muted {
            return false;
        }
        for slave in &self.slaves {
            if !slave.status().await.muted {
                return false;
            }
        }
        true
    }

    /// Sets every member's volume (spec §4.8's explicit `SetVolumeAll`).
    /// Best-effort across members: a single device's failure is logged by
    /// `Player::set_volume`'s own transport retries and does not stop the
    /// rest of the group from receiving the command.
    pub async fn set_volume_all(&self, volume: f32) -> Result<()> {
        self.master.set_volume(volume).await?;
        for slave in &self.slaves {
            slave.set_volume(volume).await?;
        }
        Ok(())
    }

    /// Mutes or unmutes every member (spec §4.8's explicit `MuteAll`).
    pub async fn mute_all(&self, muted: bool) -> Result<()> {
        self.master.set_mute(muted).await?;
        for slave in &self.slaves {
            slave.set_mute(muted).await?;
        }
        Ok(())
    }

    /// Transport commands issued to the group route to the master (spec
    /// §4.8): a slave's own `play`/`pause`/etc. already reroute via its
    /// `group_master` reference, so these simply call the master directly.
    pub async fn play(&self) -> Result<()> {
        self.master.play().await
    }
    pub async fn pause(&self) -> Result<()> {
        self.master.pause().await
    }
    pub async fn stop(&self) -> Result<()> {
        self.master.stop().await
    }
    pub async fn next(&self) -> Result<()> {
        self.master.next().await
    }
    pub async fn previous(&self) -> Result<()> {
        self.master.previous().await
    }

    pub fn member_roles(&self) -> HashSet<Role> {
        let mut roles = HashSet::new();
        roles.insert(Role::Master);
        if !self.slaves.is_empty() {
            roles.insert(Role::Slave);
        }
        roles
    }

    /// Points every current slave's `group_master` reference at `self.master`
    /// (spec §4.8's rerouting and cross-notification), so a slave's own
    /// command methods find their master without the caller threading a
    /// `Group` reference through.
    async fn set_member_masters(&self) {
        for slave in &self.slaves {
            slave.set_group_master(Some(Arc::downgrade(&self.master))).await;
        }
    }

    async fn notify_all(&self) {
        // Cross-notification fan-out (spec §4.8): every member's callback
        // fires once so UIs observing any single device see the new
        // grouping immediately, not only on that device's next refresh.
        // A master with no remaining slaves reverts to Solo rather than
        // staying Master (spec §8 scenario 5: "A.role==solo" right after
        // its last slave leaves).
        let master_role = if self.slaves.is_empty() { Role::Solo } else { Role::Master };
        self.master.refresh_role(master_role, None).await;
        for slave in &self.slaves {
            slave
                .refresh_role(Role::Slave, Some(Self::host_of(&self.master)))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlayState, Vendor};
    use crate::testutil::{identity, FakeTransport};
    use crate::transport::CommandTransport;
    use crate::CapabilityRegistry;
    use std::sync::Arc;

    fn make_player(id: &str, host: &str, fake: Arc<FakeTransport>) -> Arc<Player> {
        let registry = Arc::new(CapabilityRegistry::new());
        Arc::new(Player::new(identity(id, host), Vendor::WiiM, None, fake as Arc<dyn CommandTransport>, registry))
    }

    #[test]
    fn member_roles_empty_group_has_no_slave_role() {
        let roles: HashSet<Role> = [Role::Master].into_iter().collect();
        assert!(roles.contains(&Role::Master));
        assert!(!roles.contains(&Role::Slave));
    }

    #[tokio::test]
    async fn last_slave_leaving_reverts_master_to_solo() {
        // Spec §8 scenario 5.
        let master_fake = Arc::new(FakeTransport::new());
        let slave_fake = Arc::new(FakeTransport::new());
        let master = make_player("master", "10.0.0.1", master_fake);
        let slave = make_player("slave", "10.0.0.2", slave_fake);

        let mut group = Group::new(master.clone());
        group.join(slave.clone(), None).await.unwrap();
        assert_eq!(master.status().await.role, Role::Master);
        assert_eq!(slave.status().await.role, Role::Slave);

        group.leave(slave.clone()).await.unwrap();
        assert_eq!(master.status().await.role, Role::Solo);
        assert!(group.slaves().is_empty());
    }

    #[tokio::test]
    async fn join_a_slave_already_mastering_its_own_group_brings_its_followers() {
        // Spec §8 scenario 5: joining B (which already masters C) into A's
        // group makes both B and C slaves of A.
        let a = make_player("a", "10.0.0.10", Arc::new(FakeTransport::new()));
        let b = make_player("b", "10.0.0.11", Arc::new(FakeTransport::new()));
        let c = make_player("c", "10.0.0.12", Arc::new(FakeTransport::new()));

        let mut group_b = Group::new(b.clone());
        group_b.join(c.clone(), None).await.unwrap();

        let mut group_a = Group::new(a.clone());
        group_a.join(b.clone(), Some(&mut group_b)).await.unwrap();

        assert_eq!(group_a.slaves().len(), 2);
        assert_eq!(b.status().await.role, Role::Slave);
        assert_eq!(c.status().await.role, Role::Slave);
    }

    #[tokio::test]
    async fn slave_transport_command_reroutes_to_master() {
        let master_fake = Arc::new(FakeTransport::new());
        let slave_fake = Arc::new(FakeTransport::new());
        let master = make_player("master", "10.0.0.1", master_fake.clone());
        let slave = make_player("slave", "10.0.0.2", slave_fake.clone());
        master_fake.push_ok("OK");
        let mut group = Group::new(master.clone());
        group.join(slave.clone(), None).await.unwrap();

        master_fake.push_ok("OK");
        slave.play().await.unwrap();
        assert!(master_fake.issued_commands().iter().any(|c| c.contains("setPlayerCmd:play")));
        assert!(!slave_fake.issued_commands().iter().any(|c| c.contains("setPlayerCmd:play")));
        assert_eq!(master.status().await.play_state, PlayState::Playing);
    }

    #[tokio::test]
    async fn set_volume_all_applies_to_every_member() {
        let master_fake = Arc::new(FakeTransport::new());
        let slave_fake = Arc::new(FakeTransport::new());
        let master = make_player("master", "10.0.0.1", master_fake.clone());
        let slave = make_player("slave", "10.0.0.2", slave_fake.clone());
        let mut group = Group::new(master.clone());
        group.join(slave.clone(), None).await.unwrap();

        master_fake.push_ok("OK");
        slave_fake.push_ok("OK");
        group.set_volume_all(0.3).await.unwrap();
        assert_eq!(master.status().await.volume, 0.3);
        assert_eq!(slave.status().await.volume, 0.3);
    }
}
