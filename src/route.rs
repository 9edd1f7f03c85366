//! Translation between proxy records and gateway routes
//!
//! `build_route` produces the canonical shape: a terminal route matching the
//! hostname whose only handler is a `subroute` wrapping one `reverse_proxy`.
//! `parse_route` accepts that shape and the older bare `reverse_proxy` shape.
//! The round trip is lossy: the fixed `Host` rewrite is never reported back
//! as a custom header, and the port lives on the owning server's listener.

use crate::error::{Error, Result};
use crate::gateway::types::{
    CaSource, GatewayRoute, GatewayServer, Handler, HeaderConfig, HeaderOps, MatcherSet,
    ReverseProxyHandler, SubrouteHandler, Transport, TransportTls, Upstream,
};
use crate::proxy::{normalize_hostname, ProxyRecord};
use std::collections::BTreeMap;

/// Placeholder the gateway expands to the selected upstream's host:port
pub const UPSTREAM_HOSTPORT: &str = "{http.reverse_proxy.upstream.hostport}";

/// Private and loopback ranges declared when `trusted_proxies` is set
pub const TRUSTED_PROXY_RANGES: [&str; 6] = [
    "192.168.0.0/16",
    "172.16.0.0/12",
    "10.0.0.0/8",
    "127.0.0.1/8",
    "fd00::/8",
    "::1",
];

const HOST_HEADER: &str = "Host";

/// Build the gateway route realizing `proxy`
pub fn build_route(proxy: &ProxyRecord) -> Result<GatewayRoute> {
    let hostname = normalize_hostname(&proxy.hostname);
    if hostname.is_empty() {
        return Err(Error::Validation("hostname is required".into()));
    }
    if proxy.target.trim().is_empty() {
        return Err(Error::Validation("target is required".into()));
    }

    let mut set = BTreeMap::new();
    for (name, value) in &proxy.custom_headers {
        if name.eq_ignore_ascii_case(HOST_HEADER) {
            continue;
        }
        set.insert(name.clone(), vec![value.clone()]);
    }
    set.insert(HOST_HEADER.to_string(), vec![UPSTREAM_HOSTPORT.to_string()]);

    let trusted_proxies = if proxy.trusted_proxies {
        TRUSTED_PROXY_RANGES.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    };

    let transport = if proxy.tls_enabled || proxy.tls_cert_file.is_some() {
        Some(Transport {
            protocol: "http".to_string(),
            tls: Some(TransportTls {
                ca: proxy.tls_cert_file.as_ref().map(|file| CaSource {
                    provider: "file".to_string(),
                    pem_files: vec![file.clone()],
                }),
                root_ca_pem_files: Vec::new(),
            }),
        })
    } else {
        None
    };

    let reverse_proxy = ReverseProxyHandler {
        id: String::new(),
        upstreams: vec![Upstream {
            dial: proxy.target.trim().to_string(),
        }],
        headers: Some(HeaderConfig {
            request: Some(HeaderOps {
                set,
                ..Default::default()
            }),
            response: None,
        }),
        trusted_proxies,
        transport,
    };

    let subroute = SubrouteHandler {
        routes: vec![GatewayRoute {
            handle: vec![Handler::ReverseProxy(reverse_proxy)],
            ..Default::default()
        }],
    };

    Ok(GatewayRoute {
        id: proxy.id.clone(),
        matchers: vec![MatcherSet {
            host: vec![hostname],
            ..Default::default()
        }],
        handle: vec![Handler::Subroute(subroute)],
        group: String::new(),
        terminal: true,
    })
}

/// The single-route server object that carries `proxy` on its own listener
pub fn build_server(proxy: &ProxyRecord) -> Result<GatewayServer> {
    Ok(GatewayServer {
        listen: vec![format!(":{}", proxy.port)],
        routes: vec![build_route(proxy)?],
    })
}

/// Recover a proxy record from a route and its server's listen addresses
pub fn parse_route(route: &GatewayRoute, listen: &[String]) -> Result<ProxyRecord> {
    if route.handle.is_empty() {
        return Err(Error::Conversion("route has no handlers".into()));
    }
    let handler = find_reverse_proxy(route)
        .ok_or_else(|| Error::Conversion("not a reverse-proxy route".into()))?;

    let mut proxy = ProxyRecord {
        id: if route.id.is_empty() {
            handler.id.clone()
        } else {
            route.id.clone()
        },
        enabled: true,
        ..Default::default()
    };

    if let Some(host) = route.matchers.first().and_then(|m| m.host.first()) {
        let (hostname, port) = split_host_matcher(host);
        proxy.hostname = normalize_hostname(hostname);
        if let Some(port) = port {
            proxy.port = port;
        }
    }
    if let Some(port) = parse_listen_port(listen) {
        proxy.port = port;
    }

    if let Some(upstream) = handler.upstreams.first() {
        proxy.target = upstream.dial.clone();
    }

    if let Some(tls) = handler.transport.as_ref().and_then(|t| t.tls.as_ref()) {
        proxy.tls_enabled = true;
        proxy.tls_cert_file = tls
            .ca
            .as_ref()
            .and_then(|ca| ca.pem_files.first())
            .or_else(|| tls.root_ca_pem_files.first())
            .cloned();
    }

    if let Some(request) = handler.headers.as_ref().and_then(|h| h.request.as_ref()) {
        for (name, values) in &request.set {
            if name.eq_ignore_ascii_case(HOST_HEADER) {
                continue;
            }
            if let Some(value) = values.first() {
                proxy.custom_headers.insert(name.clone(), value.clone());
            }
        }
    }

    proxy.trusted_proxies = !handler.trusted_proxies.is_empty();

    Ok(proxy)
}

/// Parse a route straight from its wire JSON
pub fn parse_route_value(route: &serde_json::Value, listen: &[String]) -> Result<ProxyRecord> {
    let route: GatewayRoute = serde_json::from_value(route.clone())
        .map_err(|e| Error::Conversion(format!("malformed route: {}", e)))?;
    parse_route(&route, listen)
}

/// True when the route, or the reverse proxy handler inside it, carries `id`
pub fn route_has_id(route: &GatewayRoute, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    if route.id == id {
        return true;
    }
    find_reverse_proxy(route).is_some_and(|handler| handler.id == id)
}

/// The reverse proxy handler of either supported route shape
fn find_reverse_proxy(route: &GatewayRoute) -> Option<&ReverseProxyHandler> {
    match route.handle.first()? {
        Handler::ReverseProxy(handler) => Some(handler),
        Handler::Subroute(subroute) => subroute
            .routes
            .iter()
            .flat_map(|inner| inner.handle.iter())
            .find_map(|handler| match handler {
                Handler::ReverseProxy(rp) => Some(rp),
                _ => None,
            }),
        Handler::Other(_) => None,
    }
}

/// Split a host matcher that may carry a legacy `:port` suffix
fn split_host_matcher(host: &str) -> (&str, Option<u16>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((addr, port)) = rest.split_once("]:") {
            return (addr, port.parse().ok());
        }
        return (rest.trim_end_matches(']'), None);
    }
    match host.split_once(':') {
        Some((name, port)) => (name, port.parse().ok()),
        None => (host, None),
    }
}

/// First usable port among listen addresses like `:443`, `0.0.0.0:80` or `[::]:8080`
pub fn parse_listen_port(listen: &[String]) -> Option<u16> {
    listen.iter().find_map(|addr| {
        let addr = addr.trim();
        if addr.is_empty() || addr.starts_with("unix/") {
            return None;
        }
        let (_, port) = addr.rsplit_once(':')?;
        port.parse::<u16>().ok().filter(|port| *port != 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ProxyRecord {
        ProxyRecord {
            id: "p1".into(),
            ..ProxyRecord::new("a.example.com", 8443, "10.0.0.5:9000")
        }
    }

    #[test]
    fn test_build_canonical_shape() {
        let server = build_server(&sample()).unwrap();
        let value = serde_json::to_value(&server).unwrap();

        assert_eq!(value["listen"], json!([":8443"]));
        let route = &value["routes"][0];
        assert_eq!(route["@id"], "p1");
        assert_eq!(route["terminal"], true);
        assert_eq!(route["match"], json!([{"host": ["a.example.com"]}]));
        assert_eq!(route["handle"][0]["handler"], "subroute");

        let inner = &route["handle"][0]["routes"][0]["handle"][0];
        assert_eq!(inner["handler"], "reverse_proxy");
        assert_eq!(inner["upstreams"], json!([{"dial": "10.0.0.5:9000"}]));
        assert_eq!(
            inner["headers"]["request"]["set"]["Host"],
            json!([UPSTREAM_HOSTPORT])
        );
        assert!(inner.get("transport").is_none());
        assert!(inner.get("trusted_proxies").is_none());
    }

    #[test]
    fn test_build_options() {
        let mut proxy = sample();
        proxy.trusted_proxies = true;
        proxy.tls_enabled = true;
        proxy.tls_cert_file = Some("/certs/ca.pem".into());
        proxy.custom_headers.insert("X-Env".into(), "prod".into());
        proxy.custom_headers.insert("host".into(), "evil.example".into());

        let route = serde_json::to_value(build_route(&proxy).unwrap()).unwrap();
        let inner = &route["handle"][0]["routes"][0]["handle"][0];

        assert_eq!(inner["trusted_proxies"].as_array().unwrap().len(), 6);
        assert_eq!(inner["trusted_proxies"][5], "::1");
        assert_eq!(
            inner["transport"],
            json!({"protocol": "http", "tls": {"ca": {"provider": "file", "pem_files": ["/certs/ca.pem"]}}})
        );
        let set = inner["headers"]["request"]["set"].as_object().unwrap();
        assert_eq!(set["X-Env"], json!(["prod"]));
        assert_eq!(set["Host"], json!([UPSTREAM_HOSTPORT]));
        assert!(!set.contains_key("host"));
    }

    #[test]
    fn test_build_rejects_missing_fields() {
        let mut proxy = sample();
        proxy.target = " ".into();
        assert!(matches!(build_route(&proxy), Err(Error::Validation(_))));

        let mut proxy = sample();
        proxy.hostname = ".".into();
        assert!(matches!(build_route(&proxy), Err(Error::Validation(_))));
    }

    #[test]
    fn test_round_trip() {
        let mut cases = vec![sample()];

        let mut tls = sample();
        tls.tls_enabled = true;
        cases.push(tls);

        let mut tls_ca = sample();
        tls_ca.tls_enabled = true;
        tls_ca.tls_cert_file = Some("/certs/ca.pem".into());
        tls_ca.trusted_proxies = true;
        tls_ca.custom_headers.insert("X-Real-IP".into(), "{remote}".into());
        cases.push(tls_ca);

        let mut scheme = ProxyRecord::new("b.example.com.", 80, "http://backend:8080");
        scheme.id = "p2".into();
        cases.push(scheme);

        for proxy in cases {
            let server = build_server(&proxy).unwrap();
            let parsed = parse_route(&server.routes[0], &server.listen).unwrap();

            assert_eq!(parsed.id, proxy.id);
            assert_eq!(parsed.hostname, normalize_hostname(&proxy.hostname));
            assert_eq!(parsed.port, proxy.port);
            assert_eq!(parsed.target, proxy.target);
            assert_eq!(parsed.tls_enabled, proxy.tls_enabled);
            assert_eq!(parsed.tls_cert_file, proxy.tls_cert_file);
            assert_eq!(parsed.trusted_proxies, proxy.trusted_proxies);
            assert_eq!(parsed.custom_headers, proxy.custom_headers);
            assert!(parsed.enabled);
        }
    }

    #[test]
    fn test_parse_bare_reverse_proxy_with_legacy_port() {
        let route = json!({
            "match": [{"host": ["legacy.example.com:8080"]}],
            "handle": [{
                "handler": "reverse_proxy",
                "@id": "legacy-1",
                "upstreams": [{"dial": "127.0.0.1:3000"}],
                "headers": {"request": {"set": {"HOST": ["x"], "X-A": ["1"]}}},
                "transport": {"protocol": "http", "tls": {"root_ca_pem_files": ["/old/ca.pem"]}}
            }]
        });

        let parsed = parse_route_value(&route, &[]).unwrap();
        assert_eq!(parsed.id, "legacy-1");
        assert_eq!(parsed.hostname, "legacy.example.com");
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.target, "127.0.0.1:3000");
        assert!(parsed.tls_enabled);
        assert_eq!(parsed.tls_cert_file.as_deref(), Some("/old/ca.pem"));
        assert_eq!(parsed.custom_headers.len(), 1);
        assert_eq!(parsed.custom_headers["X-A"], "1");
    }

    #[test]
    fn test_listener_port_wins_over_host_matcher() {
        let route = json!({
            "match": [{"host": ["a.example.com:8080"]}],
            "handle": [{"handler": "reverse_proxy", "upstreams": [{"dial": "x:1"}]}]
        });
        let listen = vec!["unix//run/gw.sock".to_string(), ":9443".to_string()];
        assert_eq!(parse_route_value(&route, &listen).unwrap().port, 9443);
    }

    #[test]
    fn test_parse_rejects_non_proxy_routes() {
        let empty = json!({"match": [{"host": ["a.example.com"]}], "handle": []});
        let err = parse_route_value(&empty, &[]).unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));

        let static_route = json!({
            "handle": [{"handler": "static_response", "body": "ok"}]
        });
        let err = parse_route_value(&static_route, &[":80".into()]).unwrap_err();
        assert!(err.to_string().contains("not a reverse-proxy route"));

        let subroute_without_proxy = json!({
            "handle": [{"handler": "subroute", "routes": [{"handle": [{"handler": "file_server"}]}]}]
        });
        assert!(parse_route_value(&subroute_without_proxy, &[]).is_err());
    }

    #[test]
    fn test_parse_listen_port_forms() {
        let addrs = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(parse_listen_port(&addrs(&[":443"])), Some(443));
        assert_eq!(parse_listen_port(&addrs(&["0.0.0.0:80"])), Some(80));
        assert_eq!(parse_listen_port(&addrs(&["[::]:8080"])), Some(8080));
        assert_eq!(parse_listen_port(&addrs(&["tcp/:8081"])), Some(8081));
        assert_eq!(parse_listen_port(&addrs(&["unix//tmp/sock", ":8000-8010", ":81"])), Some(81));
        assert_eq!(parse_listen_port(&addrs(&["unix//tmp/sock"])), None);
        assert_eq!(parse_listen_port(&[]), None);
    }

    #[test]
    fn test_route_has_id() {
        let route = build_route(&sample()).unwrap();
        assert!(route_has_id(&route, "p1"));
        assert!(!route_has_id(&route, "p2"));
        assert!(!route_has_id(&route, ""));

        let nested: GatewayRoute = serde_json::from_value(json!({
            "handle": [{"handler": "subroute", "routes": [{"handle": [
                {"handler": "reverse_proxy", "@id": "inner", "upstreams": []}
            ]}]}]
        }))
        .unwrap();
        assert!(route_has_id(&nested, "inner"));
    }
}
