// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::time::Duration;

use crate::config::VulnScan;

/// Running more scripts at once starves small CPUs until nmap returns nothing.
pub const MAX_SCRIPTS_PER_BATCH: usize = 20;

/// A set of scripts executed by a single nmap invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub name: &'static str,
    pub scripts: &'static [&'static str],
    pub script_timeout: Duration,
    /// Additional `--script-args`.
    pub args: &'static [&'static str],
    /// Sends a `Host` header with the hostname of the target.
    pub virtual_host: bool,
}

const CVE_CHECKS: &[&str] = &[
    "http-vuln-cve2006-3392",
    "http-vuln-cve2009-3960",
    "http-vuln-cve2010-0738",
    "http-vuln-cve2010-2861",
    "http-vuln-cve2011-3192",
    "http-vuln-cve2011-3368",
    "http-vuln-cve2012-1823",
    "http-vuln-cve2013-0156",
    "http-vuln-cve2013-6786",
    "http-vuln-cve2013-7091",
    "http-vuln-cve2014-2126",
    "http-vuln-cve2014-2127",
    "http-vuln-cve2014-2128",
    "http-vuln-cve2014-2129",
    "http-vuln-cve2014-3704",
    "http-vuln-cve2014-8877",
    "http-vuln-cve2015-1427",
    "http-vuln-cve2015-1635",
    "http-vuln-cve2017-1001000",
    "http-vuln-cve2017-5638",
];

const DEVICE_CHECKS: &[&str] = &[
    "http-vuln-cve2017-5689",
    "http-vuln-cve2017-8917",
    "http-vuln-misfortune-cookie",
    "http-vuln-wnr1000-creds",
    "http-shellshock",
    "http-git",
    "http-passwd",
    "http-dlink-backdoor",
    "http-huawei-hg5xx-vuln",
    "http-tplink-dir-traversal",
    "http-vmware-path-vuln",
    "http-phpmyadmin-dir-traversal",
    "http-iis-webdav-vuln",
    "http-frontpage-login",
    "http-adobe-coldfusion-apsa1301",
    "http-avaya-ipoffice-users",
    "http-awstatstotals-exec",
    "http-axis2-dir-traversal",
];

const CONFIG_CHECKS: &[&str] = &[
    "http-enum",
    "http-cookie-flags",
    "http-cross-domain-policy",
    "http-trace",
    "http-internal-ip-disclosure",
    "http-aspnet-debug",
    "http-jsonp-detection",
    "http-method-tamper",
    "http-litespeed-sourcecode-download",
    "http-majordomo2-dir-traversal",
    "http-wordpress-users",
    "http-phpself-xss",
];

const CRAWLER_CHECKS: &[&str] = &[
    "http-csrf",
    "http-dombased-xss",
    "http-stored-xss",
    "http-sql-injection",
    "http-fileupload-exploiter",
];

/// Keeps connections to the target open until it stops responding.
const EXHAUSTION_CHECKS: &[&str] = &["http-slowloris-check"];

/// The batches of web ports in execution order.
///
/// The connection exhaustion batch degrades the target for every following
/// request and is therefore always the last one.
pub fn web_batches() -> Vec<Batch> {
    let batch = |name: &'static str,
                 scripts: &'static [&'static str],
                 secs: u64,
                 args: &'static [&'static str]| Batch {
        name,
        scripts,
        script_timeout: Duration::from_secs(secs),
        args,
        virtual_host: true,
    };
    vec![
        batch("CVE checks", CVE_CHECKS, 30, &[]),
        batch("Backdoor and device checks", DEVICE_CHECKS, 30, &[]),
        batch("Discovery and config checks", CONFIG_CHECKS, 30, &[]),
        batch(
            "Crawler checks",
            CRAWLER_CHECKS,
            60,
            &["httpspider.maxpagecount=20"],
        ),
        batch("Connection exhaustion check", EXHAUSTION_CHECKS, 60, &[]),
    ]
}

/// The `vuln` category used for every port that is not a web port.
pub fn category_batch(script_timeout: Duration) -> Batch {
    Batch {
        name: "vuln category",
        scripts: &["vuln"],
        script_timeout,
        args: &[],
        virtual_host: false,
    }
}

/// Returns the batches to scan `port` with.
pub fn batches_for(port: &str, config: &VulnScan) -> Vec<Batch> {
    let is_web = port
        .parse::<u16>()
        .map(|p| config.web_ports.contains(&p))
        .unwrap_or(false);
    if is_web {
        web_batches()
    } else {
        vec![category_batch(config.script_timeout)]
    }
}

/// Ports whose scripts are covered by another port: (redundant, superior).
const REDUNDANT_PORTS: &[(&str, &str)] = &[("139", "445")];

/// Drops ports that would only repeat the scripts of another open port.
pub fn elide_redundant_ports(ports: &[String]) -> Vec<String> {
    ports
        .iter()
        .filter(|port| {
            !REDUNDANT_PORTS
                .iter()
                .any(|(redundant, superior)| port == redundant && ports.iter().any(|p| p == superior))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(ports: &[&str]) -> Vec<String> {
        ports.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn netbios_is_dropped_when_smb_is_open() {
        assert_eq!(
            elide_redundant_ports(&ports(&["80", "445", "139"])),
            ports(&["80", "445"])
        );
        assert_eq!(
            elide_redundant_ports(&ports(&["80", "139"])),
            ports(&["80", "139"])
        );
    }

    #[test]
    fn batches_are_small() {
        for batch in web_batches() {
            assert!(batch.scripts.len() <= MAX_SCRIPTS_PER_BATCH, "{}", batch.name);
            assert!(!batch.scripts.is_empty(), "{}", batch.name);
        }
    }

    #[test]
    fn slowloris_runs_last() {
        let batches = web_batches();
        let position = batches
            .iter()
            .position(|b| b.scripts.contains(&"http-slowloris-check"));
        assert_eq!(position, Some(batches.len() - 1));
        assert_eq!(batches.last().map(|b| b.scripts.len()), Some(1));
    }

    #[test]
    fn scripts_are_not_repeated() {
        let mut scripts = web_batches()
            .iter()
            .flat_map(|b| b.scripts.iter().copied())
            .collect::<Vec<_>>();
        let count = scripts.len();
        scripts.sort_unstable();
        scripts.dedup();
        assert_eq!(scripts.len(), count);
    }

    #[test]
    fn web_ports_get_batches() {
        let config = VulnScan::default();
        assert_eq!(batches_for("8080", &config).len(), 5);
        let other = batches_for("445", &config);
        assert_eq!(other, vec![category_batch(Duration::from_secs(30))]);
        assert_eq!(batches_for("not-a-port", &config).len(), 1);
    }
}
