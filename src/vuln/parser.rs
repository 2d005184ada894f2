// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Parses the normal output of nmap scripts.
//!
//! The output of a script is a block starting with a header line:
//!
//! ```text
//! 445/tcp open  microsoft-ds
//! | smb-vuln-ms17-010:
//! |   VULNERABLE:
//! |   Remote Code Execution vulnerability in Microsoft SMBv1 servers (ms17-010)
//! |     State: VULNERABLE
//! |     IDs:  CVE:CVE-2017-0143
//! |     Risk factor: HIGH
//! |     Disclosure date: 2017-03-14
//! |     References:
//! |_      https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2017-0143
//! |_http-title: Site doesn't have a title.
//! ```
//!
//! Blocks with a `State: VULNERABLE` or `State: LIKELY VULNERABLE` line become
//! findings of that state. Other blocks with output become `FOUND` findings unless
//! the script only reports by state. Blocks with a negative result are discarded.
use std::collections::{BTreeSet, HashMap};

use lazy_regex::{Lazy, lazy_regex};
use regex::Regex;

use crate::models::{Finding, FindingState};

use super::titles::title_of;

static PORT_LINE: Lazy<Regex> = lazy_regex!(r"^(\d+/\w+)\s+\S+\s+(\S+)");
static HEADER: Lazy<Regex> = lazy_regex!(r"^\|[ _]([A-Za-z0-9][\w.-]*)\s*:(.*)$");
static MARKER: Lazy<Regex> = lazy_regex!(r"^\|[_ ]?\s*");
static STATE: Lazy<Regex> = lazy_regex!(r"State:\s+(LIKELY\s+)?VULNERABLE");
static CVE: Lazy<Regex> = lazy_regex!(r"CVE-\d{4}-\d+");

const HOST_SCRIPTS: &str = "Host script results:";
const HOST_PORT: &str = "host";
const REFERENCES: &str = "References:";
const RISK_FACTOR: &str = "Risk factor:";
const DISCLOSURE_DATE: &str = "Disclosure date:";

/// Case sensitive marker of a negative result.
const NOT_VULNERABLE: &str = "NOT VULNERABLE";
/// Lower case markers of scripts that checked and found nothing.
const NEGATIVE_MARKERS: &[&str] = &[
    "couldn't find",
    "could not find",
    "didn't find",
    "did not find",
    "no previously reported",
    "script execution failed",
    "no reply from server",
];

/// Scripts that report results only through a state line.
const STATE_ONLY_SCRIPTS: &[&str] = &[
    "http-shellshock",
    "http-slowloris-check",
    "ssl-heartbleed",
    "ssl-poodle",
    "ssl-ccs-injection",
    "ssl-dh-params",
    "sslv2-drown",
    "smb-double-pulsar-backdoor",
    "ftp-vsftpd-backdoor",
    "ftp-proftpd-backdoor",
    "ftp-libopie",
    "irc-unrealircd-backdoor",
    "distcc-cve2004-2687",
    "realvnc-auth-bypass",
];

/// `smb-vuln-ms17-010` is state only, `vulners` lists CVEs without a state.
fn is_state_only(script_id: &str) -> bool {
    script_id.split('-').any(|part| part == "vuln") || STATE_ONLY_SCRIPTS.contains(&script_id)
}

fn is_negative(text: &str) -> bool {
    if text.contains(NOT_VULNERABLE) {
        return true;
    }
    let lower = text.to_lowercase();
    NEGATIVE_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Default)]
struct Block {
    script_id: String,
    port: String,
    service: String,
    state: Option<FindingState>,
    negative: bool,
    in_references: bool,
    cves: BTreeSet<String>,
    risk: String,
    disclosure_date: String,
    references: Vec<String>,
    lines: Vec<String>,
}

impl Block {
    fn feed(&mut self, line: &str) {
        if self.negative {
            return;
        }
        let text = MARKER.replace(line, "");
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if is_negative(text) {
            self.negative = true;
            return;
        }
        if let Some(state) = STATE.captures(text) {
            self.state = Some(if state.get(1).is_some() {
                FindingState::LikelyVulnerable
            } else {
                FindingState::Vulnerable
            });
            self.in_references = false;
            return;
        }
        if text == "VULNERABLE:" || text == "LIKELY VULNERABLE:" {
            return;
        }
        if text == REFERENCES {
            self.in_references = true;
            return;
        }
        if let Some(risk) = text.strip_prefix(RISK_FACTOR) {
            self.risk = risk.trim().to_owned();
            self.in_references = false;
            return;
        }
        if let Some(date) = text.strip_prefix(DISCLOSURE_DATE) {
            self.disclosure_date = date.trim().to_owned();
            self.in_references = false;
            return;
        }
        if self.in_references {
            // cited URLs mention unrelated CVEs
            if text.contains("http://") || text.contains("https://") {
                self.references.push(text.to_owned());
            }
            return;
        }
        let before = self.cves.len();
        self.cves
            .extend(CVE.find_iter(text).map(|m| m.as_str().to_owned()));
        if self.cves.len() != before || text.starts_with("IDs:") {
            return;
        }
        self.lines.push(text.to_owned());
    }

    fn close(self) -> Option<Finding> {
        if self.negative {
            return None;
        }
        let state = match self.state {
            Some(state) => state,
            None if !self.lines.is_empty() && !is_state_only(&self.script_id) => {
                FindingState::Found
            }
            None => return None,
        };
        Some(Finding {
            title: title_of(&self.script_id),
            port: self.port,
            service: self.service,
            script_id: self.script_id,
            state,
            cves: self.cves,
            risk: self.risk,
            description: self.lines.join(" "),
            disclosure_date: self.disclosure_date,
            references: self.references,
        })
    }
}

#[derive(Debug, Default)]
struct Parser {
    port: String,
    service: String,
    current: Option<Block>,
    findings: Vec<Finding>,
}

impl Parser {
    fn close_block(&mut self) {
        if let Some(finding) = self.current.take().and_then(Block::close) {
            self.findings.push(finding);
        }
    }

    fn line(&mut self, line: &str) {
        let line = line.trim_end();
        if let Some(port) = PORT_LINE.captures(line) {
            self.close_block();
            self.port = port[1].to_owned();
            self.service = port[2].to_owned();
            return;
        }
        if line.contains(HOST_SCRIPTS) {
            self.close_block();
            self.port = HOST_PORT.to_owned();
            self.service.clear();
            return;
        }
        if let Some(header) = HEADER.captures(line) {
            self.close_block();
            let mut block = Block {
                script_id: header[1].to_owned(),
                port: self.port.clone(),
                service: self.service.clone(),
                ..Default::default()
            };
            block.feed(&header[2]);
            self.current = Some(block);
            return;
        }
        if line.starts_with('|') {
            if let Some(block) = self.current.as_mut() {
                block.feed(line);
            }
            return;
        }
        self.close_block();
    }
}

/// Parses the output of a scan of a single port.
///
/// `port` is the context of findings appearing before any port line, e.g. `80/tcp`.
pub fn parse_findings(text: &str, port: &str) -> Vec<Finding> {
    let mut parser = Parser {
        port: port.to_owned(),
        ..Default::default()
    };
    for line in text.lines() {
        parser.line(line);
    }
    parser.close_block();
    parser.findings
}

/// Merges findings of the same script into one, keeping the order of first appearance.
pub fn merge_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut merged: Vec<Finding> = Vec::with_capacity(findings.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for finding in findings {
        match index.get(&finding.script_id) {
            Some(&i) => merged[i].absorb(finding),
            None => {
                index.insert(finding.script_id.clone(), merged.len());
                merged.push(finding);
            }
        }
    }
    merged
}

/// The summary labels of the findings.
pub fn labels<'a, I>(findings: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Finding>,
{
    findings.into_iter().map(Finding::label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS17_010: &str = "\
PORT    STATE SERVICE
445/tcp open  microsoft-ds

Host script results:
| smb-vuln-ms17-010:
|   VULNERABLE:
|   Remote Code Execution vulnerability in Microsoft SMBv1 servers (ms17-010)
|     State: VULNERABLE
|     IDs:  CVE:CVE-2017-0143
|     Risk factor: HIGH
|       A critical remote code execution vulnerability exists in Microsoft SMBv1
|       servers (ms17-010).
|
|     Disclosure date: 2017-03-14
|     References:
|       https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2017-0143
|_      https://technet.microsoft.com/en-us/library/security/ms17-010.aspx
|_smb-vuln-ms10-054: false
|_smb-vuln-ms10-061: NT_STATUS_ACCESS_DENIED
";

    #[test]
    fn vulnerable_block() {
        let findings = parse_findings(MS17_010, "445/tcp");
        assert_eq!(findings.len(), 1, "{findings:#?}");
        let finding = &findings[0];
        assert_eq!(finding.script_id, "smb-vuln-ms17-010");
        assert_eq!(finding.title, "MS17-010 EternalBlue");
        assert_eq!(finding.port, "host");
        assert_eq!(finding.state, FindingState::Vulnerable);
        assert_eq!(finding.risk, "HIGH");
        assert_eq!(finding.disclosure_date, "2017-03-14");
        assert_eq!(
            finding.cves.iter().collect::<Vec<_>>(),
            vec!["CVE-2017-0143"]
        );
        assert_eq!(finding.references.len(), 2);
        assert!(
            finding
                .description
                .starts_with("Remote Code Execution vulnerability")
        );
        assert!(finding.description.ends_with("servers (ms17-010)."));
    }

    #[test]
    fn exposed_git_repository() {
        let text = "| http-git:\n|   10.0.0.5:80/.git/\n";
        let findings = parse_findings(text, "80/tcp");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].script_id, "http-git");
        assert_eq!(findings[0].state, FindingState::Found);
        assert_eq!(findings[0].port, "80/tcp");
        assert_eq!(findings[0].description, "10.0.0.5:80/.git/");
    }

    #[test]
    fn not_vulnerable_discards_block() {
        let text = "\
443/tcp open  https
| ssl-ccs-injection:
|   VULNERABLE:
|   SSL/TLS MITM vulnerability (CCS Injection)
|     State: VULNERABLE
|     IDs:  CVE:CVE-2014-0224
|     The target is NOT VULNERABLE after all
|_    Risk factor: High
";
        assert!(parse_findings(text, "").is_empty());
    }

    #[test]
    fn negative_results_are_discarded() {
        let text = "\
80/tcp open  http
|_http-csrf: Couldn't find any CSRF vulnerabilities.
|_http-stored-xss: Couldn't find any stored XSS vulnerabilities.
| http-enum:
|_  /admin/: Possible admin folder
";
        let findings = parse_findings(text, "");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].script_id, "http-enum");
        assert_eq!(findings[0].service, "http");
        assert_eq!(findings[0].description, "/admin/: Possible admin folder");
    }

    #[test]
    fn state_only_scripts_without_state_are_no_findings() {
        let text = "80/tcp open  http\n|_http-vuln-cve2011-3192: ERROR: no response\n";
        assert!(parse_findings(text, "").is_empty());
    }

    #[test]
    fn likely_vulnerable() {
        let text = "\
80/tcp open  http
| http-slowloris-check:
|   VULNERABLE:
|   Slowloris DOS attack
|     State: LIKELY VULNERABLE
|     IDs:  CVE:CVE-2007-6750
";
        let findings = parse_findings(text, "");
        assert_eq!(findings[0].state, FindingState::LikelyVulnerable);
        assert_eq!(findings[0].port, "80/tcp");
        assert_eq!(
            findings[0].label(),
            "Slowloris Denial of Service (CVE-2007-6750)"
        );
    }

    #[test]
    fn references_do_not_contribute_cves() {
        let text = "\
| smb-vuln-ms08-067:
|   VULNERABLE:
|     State: VULNERABLE
|     IDs:  CVE:CVE-2008-4250
|     References:
|_      https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2008-9999
";
        let findings = parse_findings(text, "445/tcp");
        assert_eq!(
            findings[0].cves.iter().collect::<Vec<_>>(),
            vec!["CVE-2008-4250"]
        );
    }

    #[test]
    fn vulnerable_without_cves_is_labelled_by_title() {
        let text = "| my-custom-check:\n|   State: VULNERABLE\n";
        let findings = parse_findings(text, "21/tcp");
        assert_eq!(findings[0].label(), "my-custom-check");
    }

    #[test]
    fn blocks_end_at_unmarked_lines() {
        let text = "\
| http-git:
|   10.0.0.5:80/.git/
MAC Address: AA:BB:CC:DD:EE:FF (Unknown)
|   State: VULNERABLE
";
        let findings = parse_findings(text, "80/tcp");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].state, FindingState::Found);
    }

    #[test]
    fn scripts_without_hyphen_open_blocks() {
        let vulners = "\
| vulners:
|   cpe:/a:openbsd:openssh:8.9p1:
|     \tCVE-2023-38408\t9.8\thttps://vulners.com/cve/CVE-2023-38408
|_    \tCVE-2023-28531\t9.8\thttps://vulners.com/cve/CVE-2023-28531
";
        let findings = parse_findings(&format!("22/tcp open  ssh\n{vulners}"), "");
        assert_eq!(findings.len(), 1, "{findings:#?}");
        assert_eq!(findings[0].script_id, "vulners");
        assert_eq!(findings[0].state, FindingState::Found);
        assert_eq!(findings[0].port, "22/tcp");
        assert_eq!(
            findings[0].cves.iter().collect::<Vec<_>>(),
            vec!["CVE-2023-28531", "CVE-2023-38408"]
        );

        let text = format!(
            "80/tcp open  http\n| http-enum:\n|   /admin/: Possible admin folder\n{vulners}"
        );
        let findings = parse_findings(&text, "");
        assert_eq!(findings.len(), 2, "{findings:#?}");
        assert_eq!(findings[0].script_id, "http-enum");
        assert!(findings[0].cves.is_empty());
        assert_eq!(findings[1].script_id, "vulners");
        assert_eq!(findings[1].cves.len(), 2);
    }

    #[test]
    fn indented_properties_are_no_headers() {
        let text = "\
| smb-vuln-ms08-067:
|   State: VULNERABLE
|   Risk factor: HIGH
";
        let findings = parse_findings(text, "445/tcp");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].risk, "HIGH");
    }

    #[test]
    fn merges_findings_across_ports() {
        let vulnerable = |port: &str, cve: &str| {
            format!(
                "{port}/tcp open  microsoft-ds\n| smb-vuln-ms17-010:\n|     State: VULNERABLE\n|     IDs:  CVE:{cve}\n"
            )
        };
        let mut findings = parse_findings(&vulnerable("445", "CVE-2017-0143"), "");
        findings.extend(parse_findings(&vulnerable("139", "CVE-2017-0144"), ""));
        let merged = merge_findings(findings);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].port, "445/tcp, 139/tcp");
        assert_eq!(merged[0].cves.len(), 2);
        assert_eq!(
            labels(&merged).into_iter().collect::<Vec<_>>(),
            vec!["MS17-010 EternalBlue (CVE-2017-0143, CVE-2017-0144)"]
        );
    }
}
