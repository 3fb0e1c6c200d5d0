use {
    crate::IdentityProofError,
    bytes::Bytes,
    http::status::StatusCode,
    log::debug,
    quick_xml::{events::Event, Reader},
    scratchstack_aws_principal::{AssumedRole, Principal, User},
    serde::Deserialize,
    std::collections::HashMap,
};

/// The AWS identity proven by a successful replay.
#[derive(Clone, Debug)]
pub struct Identity {
    account_id: String,
    arn: String,
    user_id: Option<String>,
    principal: Principal,
    raw_response: Bytes,
}

impl Identity {
    /// The 12-digit AWS account id.
    #[inline]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// The ARN of the caller, e.g. `arn:aws:iam::123456789012:user/alice`.
    #[inline]
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// The unique id of the caller, e.g. `AIDAEXAMPLE` or `AROAEXAMPLE:session`.
    #[inline]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The caller as a typed principal. This is empty unless the ARN is an IAM user or an assumed role.
    #[inline]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The STS response body, kept for auditing.
    #[inline]
    pub fn raw_response(&self) -> &Bytes {
        &self.raw_response
    }

    /// Parse a successful STS `GetCallerIdentity` response. XML is assumed unless `content_type` says JSON.
    ///
    /// # Errors
    /// Returns [`IdentityProofError::IdentityRejected`] carrying `status` if the body cannot be parsed or lacks
    /// `Account` or `Arn`.
    pub fn from_sts_response(
        status: StatusCode,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Self, IdentityProofError> {
        let fields = if is_json(content_type, &body) {
            json_fields(&body)
        } else {
            xml_fields(&body)
        };

        let mut fields = fields.map_err(|message| IdentityProofError::IdentityRejected {
            status,
            message: format!("Unable to parse STS response: {}", message),
        })?;

        let (Some(account_id), Some(arn)) = (fields.remove("Account"), fields.remove("Arn")) else {
            return Err(IdentityProofError::IdentityRejected {
                status,
                message: "STS response does not contain Account and Arn".to_string(),
            });
        };

        let principal = principal_from_arn(&arn);

        Ok(Self {
            account_id,
            arn,
            user_id: fields.remove("UserId"),
            principal,
            raw_response: body,
        })
    }
}

/// Describe a non-success STS response, including the error code and message when they can be parsed.
pub(crate) fn sts_error_message(content_type: Option<&str>, body: &[u8]) -> String {
    let fields = if is_json(content_type, body) {
        json_fields(body)
    } else {
        xml_fields(body)
    };

    match fields {
        Ok(fields) => match (fields.get("Code"), fields.get("Message")) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "STS returned an error without a code".to_string(),
        },
        Err(_) => "STS returned an unparseable error response".to_string(),
    }
}

fn is_json(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type {
        Some(ct) => ct.contains("json"),
        None => body.iter().find(|c| !c.is_ascii_whitespace()) == Some(&b'{'),
    }
}

/// Collect the text of the leaf elements STS uses (`Account`, `Arn`, `UserId`, `Code`, `Message`) wherever they
/// appear. The first occurrence wins.
fn xml_fields(body: &[u8]) -> Result<HashMap<String, String>, String> {
    let mut reader = Reader::from_reader(body);
    let mut result = HashMap::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let name = e.name();
                let tag_name = std::str::from_utf8(name.as_ref()).map_err(|e| e.to_string())?.to_string();
                if matches!(tag_name.as_str(), "Account" | "Arn" | "UserId" | "Code" | "Message") {
                    let text = read_text_content(&mut reader)?;
                    result.entry(tag_name).or_insert(text);
                }
            }
            Event::Eof => return Ok(result),
            _ => {}
        }
    }
}

/// Read the text content of the current element and consume its end tag. Only the outer whitespace is trimmed;
/// text around entity references is kept as written.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, String> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Text(e) => {
                let decoded = e.decode().map_err(|err| err.to_string())?;
                let unescaped = quick_xml::escape::unescape(&decoded).map_err(|err| err.to_string())?;
                text.push_str(&unescaped);
            }
            Event::GeneralRef(e) => {
                let name = e.decode().map_err(|err| err.to_string())?;
                match e.resolve_char_ref().map_err(|err| err.to_string())? {
                    Some(c) => text.push(c),
                    None => match quick_xml::escape::resolve_predefined_entity(&name) {
                        Some(s) => text.push_str(s),
                        None => return Err(format!("unknown entity &{};", name)),
                    },
                }
            }
            Event::End(_) => return Ok(text.trim().to_string()),
            Event::Eof => return Err("unexpected EOF while reading text content".to_string()),
            _ => {}
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JsonFields {
    account: Option<String>,
    arn: Option<String>,
    user_id: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JsonResult {
    get_caller_identity_result: Option<JsonFields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JsonResponse {
    get_caller_identity_response: Option<JsonResult>,
    error: Option<JsonFields>,
    #[serde(flatten)]
    flat: JsonFields,
}

/// Accepts `{"GetCallerIdentityResponse": {"GetCallerIdentityResult": {...}}}`, `{"Error": {...}}`, or the fields at
/// the top level.
fn json_fields(body: &[u8]) -> Result<HashMap<String, String>, String> {
    let response: JsonResponse = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let fields = response
        .get_caller_identity_response
        .and_then(|r| r.get_caller_identity_result)
        .or(response.error)
        .unwrap_or(response.flat);

    let mut result = HashMap::new();
    for (name, value) in [
        ("Account", fields.account),
        ("Arn", fields.arn),
        ("UserId", fields.user_id),
        ("Code", fields.code),
        ("Message", fields.message),
    ] {
        if let Some(value) = value {
            result.insert(name.to_string(), value);
        }
    }

    Ok(result)
}

/// Convert an IAM user or STS assumed-role ARN into a principal. Other ARNs produce an empty principal.
fn principal_from_arn(arn: &str) -> Principal {
    let parts = arn.splitn(6, ':').collect::<Vec<&str>>();
    if parts.len() != 6 || parts[0] != "arn" {
        debug!("Caller ARN is not an ARN: {}", arn);
        return Principal::new(vec![]);
    }

    let (partition, service, account_id, resource) = (parts[1], parts[2], parts[4], parts[5]);

    let principal = match (service, resource.split_once('/')) {
        ("iam", Some(("user", path_and_name))) => {
            let (path, user_name) = match path_and_name.rsplit_once('/') {
                Some((path, user_name)) => (format!("/{}/", path), user_name),
                None => ("/".to_string(), path_and_name),
            };
            User::new(partition, account_id, &path, user_name).ok().map(Principal::from)
        }
        ("sts", Some(("assumed-role", role_and_session))) => role_and_session
            .split_once('/')
            .and_then(|(role_name, session_name)| AssumedRole::new(partition, account_id, role_name, session_name).ok())
            .map(Principal::from),
        _ => None,
    };

    principal.unwrap_or_else(|| {
        debug!("Caller ARN does not map to a user or assumed role: {}", arn);
        Principal::new(vec![])
    })
}
