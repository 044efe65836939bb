use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::trace;

use crate::message::ParsedMessage;

/// Whether an address can be handed out for a host
fn is_host_address(address: Ipv4Addr) -> bool {
    !address.is_unspecified() && !address.is_broadcast()
}

/// Finds the address of `requested` in an answer, chasing CNAME records
///
/// The records may come in any order and chains may span several hops.
/// Every binding learned along the way, direct or through an alias, is
/// reported to `learned` once, lowercased. Returns `Ipv4Addr::UNSPECIFIED` when the
/// name doesn't resolve.
pub fn resolve_alias<F>(message: &ParsedMessage, requested: &str, mut learned: F) -> Ipv4Addr
where
    F: FnMut(&str, Ipv4Addr),
{
    let mut addresses: HashMap<String, Ipv4Addr> = HashMap::new();
    for record in message.addresses.iter() {
        if !is_host_address(record.address) {
            continue;
        }
        let name = record.name.to_ascii_lowercase();
        if !addresses.contains_key(&name) {
            learned(&name, record.address);
            addresses.insert(name, record.address);
        }
    }

    let aliases: HashMap<String, String> = message
        .aliases
        .iter()
        .map(|record| {
            (
                record.name.to_ascii_lowercase(),
                record.alias.to_ascii_lowercase(),
            )
        })
        .collect();

    loop {
        let mut progress = false;
        for (name, target) in aliases.iter() {
            if addresses.contains_key(name) {
                continue;
            }
            if let Some(&address) = addresses.get(target) {
                trace!("{} resolves to {} through {}", name, address, target);
                learned(name, address);
                addresses.insert(name.clone(), address);
                progress = true;
            }
        }
        if !progress {
            break;
        }
    }

    addresses
        .get(&requested.to_ascii_lowercase())
        .copied()
        .unwrap_or(Ipv4Addr::UNSPECIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_parser::ResponseCode;
    use crate::message::{AddressRecord, AliasRecord};

    fn answer(addresses: &[(&str, Ipv4Addr)], aliases: &[(&str, &str)]) -> ParsedMessage {
        ParsedMessage {
            id: 1,
            is_question: false,
            response_code: ResponseCode::NoError,
            questions: vec![],
            addresses: addresses
                .iter()
                .map(|&(name, address)| AddressRecord {
                    name: name.into(),
                    address,
                })
                .collect(),
            aliases: aliases
                .iter()
                .map(|&(name, alias)| AliasRecord {
                    name: name.into(),
                    alias: alias.into(),
                })
                .collect(),
            name_servers: vec![],
        }
    }

    #[test]
    fn single_alias() {
        let message = answer(
            &[("b.example.com", Ipv4Addr::new(5, 6, 7, 8))],
            &[("a.example.com", "b.example.com")],
        );
        let mut learned = Vec::new();
        let address = resolve_alias(&message, "a.example.com", |name, address| {
            learned.push((name.to_string(), address))
        });
        assert_eq!(address, Ipv4Addr::new(5, 6, 7, 8));
        assert_eq!(
            learned,
            vec![
                ("b.example.com".to_string(), Ipv4Addr::new(5, 6, 7, 8)),
                ("a.example.com".to_string(), Ipv4Addr::new(5, 6, 7, 8)),
            ]
        );

        let absent = resolve_alias(&message, "c.example.com", |_, _| ());
        assert_eq!(absent, Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn unordered_chain() {
        let message = answer(
            &[("d.example.net", Ipv4Addr::new(9, 9, 9, 9))],
            &[
                ("a.example.com", "b.example.com"),
                ("c.example.org", "d.example.net"),
                ("b.example.com", "c.example.org"),
            ],
        );
        let mut count = 0;
        let address = resolve_alias(&message, "A.Example.COM", |_, _| count += 1);
        assert_eq!(address, Ipv4Addr::new(9, 9, 9, 9));
        assert_eq!(count, 4);
    }

    #[test]
    fn direct_address_and_unusable_addresses() {
        let message = answer(
            &[
                ("a.example.com", Ipv4Addr::UNSPECIFIED),
                ("b.example.com", Ipv4Addr::new(1, 1, 1, 1)),
            ],
            &[],
        );
        let mut learned = Vec::new();
        assert_eq!(
            resolve_alias(&message, "a.example.com", |name, _| learned.push(name.to_string())),
            Ipv4Addr::UNSPECIFIED
        );
        assert_eq!(learned, vec!["b.example.com".to_string()]);
        assert_eq!(
            resolve_alias(&message, "b.example.com", |_, _| ()),
            Ipv4Addr::new(1, 1, 1, 1)
        );
    }

    #[test]
    fn bindings_are_reported_lowercased() {
        let message = answer(
            &[("Edge.Example.NET", Ipv4Addr::new(10, 1, 2, 3))],
            &[("WWW.example.com", "edge.EXAMPLE.net")],
        );
        let mut learned = Vec::new();
        let address = resolve_alias(&message, "www.example.com", |name, address| {
            learned.push((name.to_string(), address))
        });
        assert_eq!(address, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(
            learned,
            vec![
                ("edge.example.net".to_string(), Ipv4Addr::new(10, 1, 2, 3)),
                ("www.example.com".to_string(), Ipv4Addr::new(10, 1, 2, 3)),
            ]
        );
    }

    #[test]
    fn alias_cycle_terminates() {
        let message = answer(
            &[],
            &[("a.example.com", "b.example.com"), ("b.example.com", "a.example.com")],
        );
        assert_eq!(
            resolve_alias(&message, "a.example.com", |_, _| ()),
            Ipv4Addr::UNSPECIFIED
        );
    }
}
