use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use dnsrelay::{DnsServer, EncryptedListener, ServerConfig, StaticHosts};

pub fn main() {
    env_logger::init();

    let upstream: SocketAddr = env::args()
        .nth(1)
        .unwrap_or_else(|| "1.1.1.1:53".to_owned())
        .parse()
        .expect("upstream must be ip:port");

    let hosts = StaticHosts::new(vec![("router.lan".to_owned(), Ipv4Addr::new(192, 168, 1, 1))]);

    let config = ServerConfig {
        plain_addr: "127.0.0.1:5353".parse().unwrap(),
        encrypted: Some(EncryptedListener {
            addr: "127.0.0.1:5354".parse().unwrap(),
            secret: b"relay demo secret".to_vec(),
        }),
        forward_address: Some(upstream),
        ..ServerConfig::default()
    };

    let server = DnsServer::new(config, Arc::new(hosts)).unwrap();
    println!("listening on {}", server.local_addr());

    loop {
        ::std::thread::sleep(::std::time::Duration::from_secs(10));
        println!("{} questions waiting upstream", server.pending_forwards());
    }
}
