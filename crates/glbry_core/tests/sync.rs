//! Writer and reader sessions sharing one in-memory network.

use std::path::Path;

use glbry_core::chain::file_sha1_hex;
use glbry_core::config::{Channel, Config};
use glbry_core::git::ObjectId;
use glbry_core::memory::{InMemoryGit, InMemoryNetwork};
use glbry_core::push::PushSpec;
use glbry_core::settings::RepoSettings;
use glbry_core::startup::Remote;

const ADDRESS: &str = "lbry://@alice/repo";

fn channel(claim_id: &str, name: &str) -> Channel {
    Channel {
        claim_id: claim_id.into(),
        name: name.into(),
    }
}

fn config(dir: &Path, push_as: Option<Channel>) -> Config {
    Config {
        data_dir: Some(dir.to_path_buf()),
        push_as,
        ..Config::default()
    }
}

fn publish_settings(network: &InMemoryNetwork, settings: &RepoSettings) {
    network.set_content(ADDRESS, settings.to_json().unwrap().into_bytes());
}

fn push_main(
    dir: &Path,
    network: &InMemoryNetwork,
    git: &InMemoryGit,
    push_as: Channel,
    id: u8,
) -> String {
    git.set_local_ref("refs/heads/main", ObjectId::from_bytes([id; 20]));
    let mut remote = Remote::open(ADDRESS, &config(dir, Some(push_as)), network.clone(), git.clone())
        .unwrap();
    let spec: PushSpec = "refs/heads/main:refs/heads/main".parse().unwrap();
    remote.push_batch(&[spec]).unwrap();
    remote.prior_hash().to_string()
}

fn main_id(remote: &Remote<InMemoryNetwork, InMemoryGit>) -> Option<ObjectId> {
    remote
        .refs()
        .iter()
        .find(|r| r.name == "refs/heads/main")
        .map(|r| r.id)
}

#[test]
fn test_reader_follows_writer_across_sessions() {
    let writer_dir = tempfile::tempdir().unwrap();
    let reader_dir = tempfile::tempdir().unwrap();
    let network = InMemoryNetwork::new();
    publish_settings(&network, &RepoSettings::new_with_author("A1", "@alice", 1000));
    network.set_time(2000);
    let writer_git = InMemoryGit::new();
    let alice = channel("A1", "@alice");

    let h0 = push_main(writer_dir.path(), &network, &writer_git, alice.clone(), 1);
    assert_eq!(network.published()[0].description.as_deref(), Some(""));

    let reader_git = InMemoryGit::new();
    let reader = Remote::open(
        ADDRESS,
        &config(reader_dir.path(), None),
        network.clone(),
        reader_git.clone(),
    )
    .unwrap();
    let state = reader.sync_state();
    assert_eq!(state.download_index, 1);
    assert_eq!(state.applied_index, 1);
    assert_eq!(state.download_prior_hash, h0);
    assert_eq!(
        file_sha1_hex(&reader.layout().in_bundle_path(0)).unwrap(),
        h0
    );
    assert_eq!(main_id(&reader), Some(ObjectId::from_bytes([1; 20])));
    drop(reader);

    network.set_time(2100);
    push_main(writer_dir.path(), &network, &writer_git, alice, 2);
    let published = network.published();
    assert_eq!(published[1].name, "repo-1");
    assert_eq!(published[1].description.as_deref(), Some(h0.as_str()));

    let reader = Remote::open(
        ADDRESS,
        &config(reader_dir.path(), None),
        network.clone(),
        reader_git.clone(),
    )
    .unwrap();
    assert_eq!(reader.sync_state().download_index, 2);
    assert_eq!(reader.sync_state().applied_index, 2);
    assert_eq!(main_id(&reader), Some(ObjectId::from_bytes([2; 20])));
    assert_eq!(reader_git.unbundled().len(), 2);
}

#[test]
fn test_bundles_from_unlisted_channel_are_ignored() {
    let writer_dir = tempfile::tempdir().unwrap();
    let reader_dir = tempfile::tempdir().unwrap();
    let network = InMemoryNetwork::new();
    publish_settings(&network, &RepoSettings::new_with_author("A1", "@alice", 1000));
    network.set_time(2000);

    push_main(
        writer_dir.path(),
        &network,
        &InMemoryGit::new(),
        channel("B2", "@bob"),
        9,
    );
    assert_eq!(network.published()[0].name, "repo-0");

    let reader = Remote::open(
        ADDRESS,
        &config(reader_dir.path(), None),
        network,
        InMemoryGit::new(),
    )
    .unwrap();
    assert_eq!(reader.sync_state().download_index, 0);
    assert!(reader.refs().is_empty());
}

#[test]
fn test_bundles_after_revocation_are_ignored() {
    let writer_dir = tempfile::tempdir().unwrap();
    let reader_dir = tempfile::tempdir().unwrap();
    let network = InMemoryNetwork::new();
    let mut settings = RepoSettings::new_with_author("A1", "@alice", 1000);
    settings.grant("B2", "@bob", 1000);
    publish_settings(&network, &settings);

    // Bob publishes repo-0 while granted.
    network.set_time(1200);
    let bob_git = InMemoryGit::new();
    let bob = channel("B2", "@bob");
    push_main(writer_dir.path(), &network, &bob_git, bob.clone(), 1);

    // Bob is revoked, then publishes repo-1 anyway.
    settings.revoke("B2", 1500);
    publish_settings(&network, &settings);
    network.set_time(2000);
    push_main(writer_dir.path(), &network, &bob_git, bob, 2);
    assert_eq!(network.published()[1].name, "repo-1");

    let reader = Remote::open(
        ADDRESS,
        &config(reader_dir.path(), None),
        network.clone(),
        InMemoryGit::new(),
    )
    .unwrap();
    assert_eq!(reader.sync_state().download_index, 1);
    assert_eq!(main_id(&reader), Some(ObjectId::from_bytes([1; 20])));
    drop(reader);

    // Alice can still continue the chain at slot 1.
    let alice_dir = tempfile::tempdir().unwrap();
    let alice_git = InMemoryGit::new();
    let alice = Remote::open(
        ADDRESS,
        &config(alice_dir.path(), Some(channel("A1", "@alice"))),
        network.clone(),
        alice_git.clone(),
    )
    .unwrap();
    assert_eq!(alice.next_slot(), 1);
    drop(alice);
    push_main(alice_dir.path(), &network, &alice_git, channel("A1", "@alice"), 3);

    let reader = Remote::open(
        ADDRESS,
        &config(reader_dir.path(), None),
        network,
        InMemoryGit::new(),
    )
    .unwrap();
    assert_eq!(reader.sync_state().download_index, 2);
}
