// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

/// Human readable titles of well known scripts.
const TITLES: &[(&str, &str)] = &[
    ("smb-vuln-ms17-010", "MS17-010 EternalBlue"),
    ("smb-vuln-ms08-067", "MS08-067 NetAPI"),
    ("smb-vuln-ms10-054", "MS10-054 SMB Pool Overflow"),
    ("smb-vuln-ms10-061", "MS10-061 Print Spooler Impersonation"),
    ("smb-vuln-cve2009-3103", "SMBv2 Negotiate Remote Code Execution"),
    ("smb-vuln-regsvc-dos", "SMB Registry Service Denial of Service"),
    ("smb-double-pulsar-backdoor", "DoublePulsar SMB Backdoor"),
    ("smb2-vuln-uptime", "SMBv2 Missing Patches (Uptime)"),
    ("ssl-heartbleed", "OpenSSL Heartbleed"),
    ("ssl-poodle", "SSLv3 POODLE"),
    ("ssl-ccs-injection", "OpenSSL CCS Injection"),
    ("ssl-dh-params", "Weak Diffie-Hellman Parameters"),
    ("sslv2-drown", "SSLv2 DROWN"),
    ("ssl-cert-intaddr", "Certificate Discloses Internal Address"),
    ("rdp-vuln-ms12-020", "MS12-020 RDP Denial of Service"),
    ("ftp-vsftpd-backdoor", "vsftpd 2.3.4 Backdoor"),
    ("ftp-proftpd-backdoor", "ProFTPD 1.3.3c Backdoor"),
    ("ftp-libopie", "OPIE Off-by-One Stack Overflow"),
    ("smtp-vuln-cve2010-4344", "Exim Heap Overflow"),
    ("smtp-vuln-cve2011-1720", "Postfix Memory Corruption"),
    ("smtp-vuln-cve2011-1764", "Exim DKIM Format String"),
    ("distcc-cve2004-2687", "distcc Remote Code Execution"),
    ("irc-unrealircd-backdoor", "UnrealIRCd Backdoor"),
    ("realvnc-auth-bypass", "RealVNC Authentication Bypass"),
    ("mysql-vuln-cve2012-2122", "MySQL Authentication Bypass"),
    ("samba-vuln-cve-2012-1182", "Samba NDR Heap Overflow"),
    ("http-shellshock", "Shellshock"),
    ("http-git", "Exposed Git Repository"),
    ("http-passwd", "Directory Traversal (passwd)"),
    ("http-enum", "Interesting Web Paths"),
    ("http-trace", "HTTP TRACE Enabled"),
    ("http-cookie-flags", "Insecure Cookie Flags"),
    ("http-cross-domain-policy", "Permissive Cross-Domain Policy"),
    ("http-internal-ip-disclosure", "Internal IP Disclosure"),
    ("http-aspnet-debug", "ASP.NET Debugging Enabled"),
    ("http-jsonp-detection", "JSONP Endpoint"),
    ("http-method-tamper", "HTTP Verb Tampering"),
    ("http-csrf", "Cross-Site Request Forgery"),
    ("http-dombased-xss", "DOM Based XSS"),
    ("http-stored-xss", "Stored XSS"),
    ("http-phpself-xss", "PHP_SELF XSS"),
    ("http-sql-injection", "SQL Injection"),
    ("http-fileupload-exploiter", "Unrestricted File Upload"),
    ("http-slowloris-check", "Slowloris Denial of Service"),
    ("http-dlink-backdoor", "D-Link Router Backdoor"),
    ("http-huawei-hg5xx-vuln", "Huawei HG5xx Information Disclosure"),
    ("http-tplink-dir-traversal", "TP-Link Directory Traversal"),
    ("http-vmware-path-vuln", "VMware Path Traversal"),
    ("http-phpmyadmin-dir-traversal", "phpMyAdmin Directory Traversal"),
    ("http-iis-webdav-vuln", "IIS WebDAV Authentication Bypass"),
    ("http-frontpage-login", "FrontPage Anonymous Login"),
    ("http-adobe-coldfusion-apsa1301", "ColdFusion Authentication Bypass"),
    ("http-avaya-ipoffice-users", "Avaya IP Office User Disclosure"),
    ("http-awstatstotals-exec", "AWStats Totals Command Execution"),
    ("http-axis2-dir-traversal", "Apache Axis2 Directory Traversal"),
    ("http-litespeed-sourcecode-download", "LiteSpeed Source Code Disclosure"),
    ("http-majordomo2-dir-traversal", "Majordomo2 Directory Traversal"),
    ("http-wordpress-users", "WordPress User Enumeration"),
    ("http-vuln-misfortune-cookie", "Misfortune Cookie"),
    ("http-vuln-wnr1000-creds", "Netgear WNR1000 Credential Disclosure"),
    ("http-vuln-cve2006-3392", "Webmin File Disclosure"),
    ("http-vuln-cve2010-2861", "ColdFusion Directory Traversal"),
    ("http-vuln-cve2011-3192", "Apache Range Header DoS"),
    ("http-vuln-cve2011-3368", "Apache Reverse Proxy Bypass"),
    ("http-vuln-cve2012-1823", "PHP-CGI Argument Injection"),
    ("http-vuln-cve2013-0156", "Ruby on Rails Object Injection"),
    ("http-vuln-cve2014-3704", "Drupalgeddon SQL Injection"),
    ("http-vuln-cve2015-1427", "Elasticsearch Groovy RCE"),
    ("http-vuln-cve2015-1635", "MS15-034 HTTP.sys RCE"),
    ("http-vuln-cve2017-1001000", "WordPress REST API Content Injection"),
    ("http-vuln-cve2017-5638", "Apache Struts RCE"),
    ("http-vuln-cve2017-5689", "Intel AMT Authentication Bypass"),
    ("http-vuln-cve2017-8917", "Joomla SQL Injection"),
];

/// Returns the title of a well known script.
pub fn friendly_title(script_id: &str) -> Option<&'static str> {
    TITLES
        .iter()
        .find(|(id, _)| *id == script_id)
        .map(|(_, title)| *title)
}

/// Returns the friendly title or the identifier itself.
pub(super) fn title_of(script_id: &str) -> String {
    friendly_title(script_id)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| script_id.to_owned())
}
