//! Parsing counterpart to `dav::xml::build_acl_body` — decodes a
//! `DAV:acl` response body (RFC 3744 §5.5) into [`Acl`].

use crate::dav::model::{Ace, Acl, Principal, Privilege};
use quick_xml::Reader;
use quick_xml::events::Event;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AclParseError {
    #[error("xml parsing error: {0}")]
    Xml(String),
}

fn local_name(raw: &[u8]) -> String {
    let local = match raw.iter().position(|b| *b == b':') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    };
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

fn privilege_from_name(name: &str) -> Option<Privilege> {
    Some(match name {
        "read" => Privilege::Read,
        "write" => Privilege::Write,
        "write-properties" => Privilege::WriteProperties,
        "write-content" => Privilege::WriteContent,
        "unlock" => Privilege::Unlock,
        "read-acl" => Privilege::ReadAcl,
        "write-acl" => Privilege::WriteAcl,
        "read-current-user-privilege-set" => Privilege::ReadCurrentUserPrivilegeSet,
        "bind" => Privilege::Bind,
        "unbind" => Privilege::Unbind,
        "all" => Privilege::All,
        _ => return None,
    })
}

#[derive(Default)]
struct AceBuilder {
    principal: Option<Principal>,
    grant: Vec<Privilege>,
    deny: Vec<Privilege>,
    inherited: Option<String>,
    in_grant: bool,
    in_deny: bool,
    in_principal: bool,
    in_property: bool,
    href_text: Option<String>,
}

pub fn parse_acl(body: &str) -> Result<Acl, AclParseError> {
    let mut xml = Reader::from_str(body);
    xml.config_mut().trim_text(true);

    let mut aces = Vec::new();
    let mut current: Option<AceBuilder> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    fn enter_element(name: &str, current: &mut Option<AceBuilder>) {
        match name {
            "ace" => *current = Some(AceBuilder::default()),
            "grant" => {
                if let Some(a) = current {
                    a.in_grant = true;
                }
            }
            "deny" => {
                if let Some(a) = current {
                    a.in_deny = true;
                }
            }
            "principal" => {
                if let Some(a) = current {
                    a.in_principal = true;
                }
            }
            "property" => {
                if let Some(a) = current {
                    a.in_property = true;
                }
            }
            "all" | "authenticated" | "unauthenticated" | "self" => {
                if let Some(a) = current {
                    if a.in_principal && !a.in_property {
                        a.principal = Some(match name {
                            "all" => Principal::All,
                            "authenticated" => Principal::Authenticated,
                            "unauthenticated" => Principal::Unauthenticated,
                            _ => Principal::SelfPrincipal,
                        });
                    }
                }
            }
            "protected" | "inherited" => {}
            other => {
                if let Some(a) = current {
                    if a.in_principal && a.in_property && other != "href" {
                        a.principal = Some(Principal::Property(other.to_string()));
                    } else if (a.in_grant || a.in_deny) && other != "privilege" {
                        if let Some(p) = privilege_from_name(other) {
                            if a.in_grant {
                                a.grant.push(p);
                            } else {
                                a.deny.push(p);
                            }
                        }
                    }
                }
            }
        }

        if name == "href" {
            if let Some(a) = current {
                a.href_text = Some(String::new());
            }
        }
    }

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                stack.push(name.clone());
                enter_element(&name, &mut current);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                enter_element(&name, &mut current);
            }
            Ok(Event::Text(e)) => {
                if stack.last().map(String::as_str) == Some("href") {
                    let text = e.unescape().map_err(|e| AclParseError::Xml(e.to_string()))?;
                    let under_inherited = stack.len() >= 2 && stack[stack.len() - 2] == "inherited";
                    if let Some(a) = &mut current {
                        if under_inherited {
                            a.inherited = Some(text.into_owned());
                        } else if let Some(buf) = &mut a.href_text {
                            buf.push_str(&text);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "href" => {
                        let under_inherited = stack.len() >= 2 && stack[stack.len() - 2] == "inherited";
                        if let Some(a) = &mut current {
                            if !under_inherited && a.in_principal && !a.in_property {
                                if let Some(text) = a.href_text.take() {
                                    a.principal = Some(Principal::Href(text));
                                }
                            }
                        }
                    }
                    "grant" => {
                        if let Some(a) = &mut current {
                            a.in_grant = false;
                        }
                    }
                    "deny" => {
                        if let Some(a) = &mut current {
                            a.in_deny = false;
                        }
                    }
                    "principal" => {
                        if let Some(a) = &mut current {
                            a.in_principal = false;
                        }
                    }
                    "property" => {
                        if let Some(a) = &mut current {
                            a.in_property = false;
                        }
                    }
                    "ace" => {
                        if let Some(a) = current.take() {
                            aces.push(Ace {
                                principal: a.principal.unwrap_or(Principal::Authenticated),
                                grant: a.grant.into_iter().collect(),
                                deny: a.deny.into_iter().collect(),
                                inherited: a.inherited,
                            });
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AclParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(Acl { aces })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_href_principal_with_grant() {
        let body = r#"<D:acl xmlns:D="DAV:"><D:ace>
            <D:principal><D:href>/principals/users/alice/</D:href></D:principal>
            <D:grant><D:privilege><D:read/></D:privilege><D:privilege><D:write/></D:privilege></D:grant>
        </D:ace></D:acl>"#;
        let acl = parse_acl(body).unwrap();
        assert_eq!(acl.aces.len(), 1);
        assert_eq!(acl.aces[0].principal, Principal::Href("/principals/users/alice/".to_string()));
        assert!(acl.aces[0].grants(Privilege::Read));
        assert!(acl.aces[0].grants(Privilege::Write));
        assert!(!acl.aces[0].grants(Privilege::WriteAcl));
    }

    #[test]
    fn all_privilege_grant_implies_every_privilege() {
        let body = r#"<D:acl xmlns:D="DAV:"><D:ace>
            <D:principal><D:all/></D:principal>
            <D:grant><D:privilege><D:all/></D:privilege></D:grant>
        </D:ace></D:acl>"#;
        let acl = parse_acl(body).unwrap();
        assert_eq!(acl.aces[0].principal, Principal::All);
        assert!(acl.aces[0].grants(Privilege::WriteAcl));
    }
}
