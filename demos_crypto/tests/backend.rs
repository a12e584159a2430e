use demos_crypto::*;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

fn socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("demos-crypto-{}.sock", Uuid::new_v4()))
}

/// Bind a backend and serve it on a background thread
fn spawn(address: Address) -> Address {
    let mut config = ServerConfig::new(address);
    config.workers = 2;
    config.max_request = 1024 * 1024;
    serve(config)
}

fn serve(config: ServerConfig) -> Address {
    let server = Server::bind(config).unwrap();
    let address = server.local_address().unwrap();
    thread::spawn(move || server.serve());
    address
}

#[test]
fn unix_socket_round_trip() {
    let path = socket_path();
    let address = spawn(Address::Unix(path.clone()));
    let client = Client::new(ClientConfig::new(address));

    let key = client.key_gen(Group::Ristretto255, 10, 3).unwrap();
    key.validate().unwrap();

    let parts = client.gen_ballot(&key, 4).unwrap();
    assert_eq!(parts.len(), 4);
    assert!(parts.iter().all(|part| part.len() == 3));

    // Combine option 1 of two parts
    let coms = vec![parts[0][1].com.clone(), parts[2][1].com.clone()];
    let decoms = vec![parts[0][1].decom.clone(), parts[2][1].decom.clone()];
    let com = client.add_com(&key, coms).unwrap();
    let decom = client.add_decom(&key, decoms).unwrap();
    assert!(client.verify_com(&key.public_only(), &com, &decom).unwrap());
    assert_eq!(decode_tally(&decom.message, 10, 3), Some(vec![0, 2, 0]));

    let coins = Coins::from_bitmap(vec![true, false]);
    let pending: Vec<PendingZk> = parts[1]
        .iter()
        .map(|cell| PendingZk {
            zk1: cell.zk1.clone(),
            zk_state: cell.zk_state.clone(),
        })
        .collect();
    let zk2 = client.complete_zk(&key.public_only(), &coins, pending).unwrap();
    for (cell, zk2) in parts[1].iter().zip(zk2.iter()) {
        assert!(verify_zk(&key, coins.as_str(), &cell.com, &cell.zk1, zk2));
    }

    // Validation failures come back in band
    match client.gen_ballot(&key, 3) {
        Err(Error::Backend(message)) => assert!(message.contains("even")),
        other => panic!("unexpected {:?}", other),
    }

    let _ = std::fs::remove_file(path);
}

#[test]
fn tally_over_tcp() {
    let address = spawn("ipv4:127.0.0.1:0".parse().unwrap());
    let client = Client::new(ClientConfig::new(address));

    let store = Arc::new(MemStore::default());
    let id = Uuid::new_v4();
    SetupJob::new(client.clone(), store.clone(), id, 3, vec![2])
        .run(&ProgressCounter::default())
        .unwrap();

    let mut ballots = store.ballots(id, FIRST_SERIAL..FIRST_SERIAL + 3).unwrap();
    ballots[0].vote(Side::A, 0, 0);
    ballots[1].vote(Side::B, 0, 1);
    ballots[2].vote(Side::A, 0, 0);
    store.put_ballots(id, ballots).unwrap();

    let mut job = TallyJob::new(client, store.clone(), id);
    let counts = job.run(&ProgressCounter::default()).unwrap();
    assert_eq!(counts, vec![vec![2, 1]]);
}

#[test]
fn oversized_response_is_refused() {
    let path = socket_path();
    let address = spawn(Address::Unix(path.clone()));

    let mut config = ClientConfig::new(address);
    config.max_response = 256;
    let client = Client::new(config);

    let key = Dispatcher::new().key_gen(Group::Ristretto255, 10, 3).unwrap();
    match client.gen_ballot(&key, 8) {
        Err(Error::SizeLimitExceeded(len, 256)) => assert!(len > 256),
        other => panic!("unexpected {:?}", other),
    }

    let _ = std::fs::remove_file(path);
}

#[test]
fn oversized_request_is_dropped() {
    let path = socket_path();
    spawn(Address::Unix(path.clone()));

    // Declare 1 GiB and send nothing else
    let mut stream = UnixStream::connect(&path).unwrap();
    stream.write_all(&(1u32 << 30).to_be_bytes()).unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).unwrap();
    assert!(buf.is_empty());

    let _ = std::fs::remove_file(path);
}

#[test]
fn ballot_requests_are_capped() {
    let path = socket_path();
    let mut config = ServerConfig::new(Address::Unix(path.clone()));
    config.workers = 1;
    config.max_ballot_parts = 4;
    let client = Client::new(ClientConfig::new(serve(config)));

    let key = client.key_gen(Group::Ristretto255, 10, 2).unwrap();
    assert_eq!(client.gen_ballot(&key, 4).unwrap().len(), 4);
    match client.gen_ballot(&key, u32::MAX - 1) {
        Err(Error::Backend(message)) => assert!(message.contains("at most 4")),
        other => panic!("unexpected {:?}", other),
    }

    let _ = std::fs::remove_file(path);
}
