//! Authentication handshake messages
//!
//! Logon takes two function calls. The first announces the username and
//! client environment and receives the server's challenge: salt material
//! (`AUTH_VFR_DATA`), its half of the session key (`AUTH_SESSKEY`) and, on
//! 12c-scheme servers, the PBKDF2 parameters. The second call answers with
//! the client session key half, the password encrypted under the derived
//! combo key, and the speedy key. Success establishes session id, serial
//! number and server version.
//!
//! Variants: proxy authentication adds `AUTH_PROXY_CLIENT`; a password
//! change adds `AUTH_NEWPASSWORD` under the change-password mode flag.

use std::collections::HashMap;

use crate::buffer::WriteBuffer;
use crate::config::ConnectParams;
use crate::constants::{auth_mode, FunctionCode};
use crate::crypto::{
    self, combo_key_11g, combo_key_12c, decrypt_cbc_192, decrypt_cbc_256, encrypt_cbc_192,
    encrypt_cbc_256_pkcs7, password_hash_11g, password_hash_12c, password_key_12c, VerifierType,
};
use crate::error::{Error, Result};
use crate::messages::write_function_header;

/// Handshake progress, advanced by each build/process step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Nothing sent yet
    Init,
    /// Challenge request sent, waiting for salt and server session key
    ChallengeRequested,
    /// Challenge material received, verifier not yet sent
    ChallengeReceived,
    /// Verifier sent, waiting for the server verdict
    VerifierSent,
    /// Session established
    Authenticated,
}

/// Challenge and session material received from the server
#[derive(Debug, Default, Clone)]
pub struct SessionData {
    /// Server session key half (hex)
    pub auth_sesskey: Option<String>,
    /// Verifier salt data (hex)
    pub auth_vfr_data: Option<String>,
    /// Verifier scheme announced by the server
    pub verifier_type: Option<u32>,
    /// PBKDF2 combo-key salt (hex, 12c)
    pub auth_pbkdf2_csk_salt: Option<String>,
    /// PBKDF2 iterations for the password key (12c)
    pub auth_pbkdf2_vgen_count: Option<u32>,
    /// PBKDF2 iterations for the combo key (12c)
    pub auth_pbkdf2_sder_count: Option<u32>,
    /// Session id assigned after phase two
    pub session_id: Option<u32>,
    /// Session serial number assigned after phase two
    pub serial_number: Option<u16>,
    /// Server version banner
    pub version: Option<String>,
}

impl SessionData {
    /// Fold in key/value pairs from a server parameter message
    pub fn absorb(&mut self, pairs: &HashMap<String, String>) {
        for (key, value) in pairs {
            match key.as_str() {
                "AUTH_SESSKEY" => self.auth_sesskey = Some(value.clone()),
                "AUTH_VFR_DATA" => self.auth_vfr_data = Some(value.clone()),
                "AUTH_VFR_TYPE" => self.verifier_type = value.parse().ok(),
                "AUTH_PBKDF2_CSK_SALT" => self.auth_pbkdf2_csk_salt = Some(value.clone()),
                "AUTH_PBKDF2_VGEN_COUNT" => self.auth_pbkdf2_vgen_count = value.parse().ok(),
                "AUTH_PBKDF2_SDER_COUNT" => self.auth_pbkdf2_sder_count = value.parse().ok(),
                "AUTH_SESSION_ID" => self.session_id = value.parse().ok(),
                "AUTH_SERIAL_NUM" => self.serial_number = value.parse().ok(),
                "AUTH_VERSION_STRING" => self.version = Some(value.clone()),
                _ => {}
            }
        }
    }
}

/// Client environment strings sent with the challenge request
#[derive(Debug, Clone)]
struct ClientInfo {
    terminal: String,
    program: String,
    machine: String,
    osuser: String,
    pid: String,
}

impl ClientInfo {
    fn gather() -> Self {
        Self {
            terminal: std::env::var("TERM").unwrap_or_else(|_| "unknown".into()),
            program: std::env::current_exe()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "oranet".into()),
            machine: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into()),
            osuser: std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "unknown".into()),
            pid: std::process::id().to_string(),
        }
    }
}

/// Driver side of the authentication handshake
#[derive(Debug)]
pub struct AuthRequest {
    username: String,
    password: Vec<u8>,
    proxy_client: Option<String>,
    new_password: Option<Vec<u8>>,
    mode: u32,
    phase: AuthPhase,
    session_data: SessionData,
    client_info: ClientInfo,
}

impl AuthRequest {
    /// Start a handshake for the given connection parameters
    pub fn new(params: &ConnectParams) -> Self {
        let mut mode = auth_mode::LOGON | auth_mode::WITH_PASSWORD;
        if params.new_password.is_some() {
            mode |= auth_mode::CHANGE_PASSWORD;
        }
        Self {
            username: params.username.to_uppercase(),
            password: params.password().as_bytes().to_vec(),
            proxy_client: params.proxy_client.clone(),
            new_password: params
                .new_password
                .as_ref()
                .map(|p| p.as_bytes().to_vec()),
            mode,
            phase: AuthPhase::Init,
            session_data: SessionData::default(),
            client_info: ClientInfo::gather(),
        }
    }

    /// Current handshake phase
    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Session material accumulated so far
    pub fn session_data(&self) -> &SessionData {
        &self.session_data
    }

    /// Write the challenge request (phase one) message body
    pub fn write_challenge_request(&mut self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        if self.phase != AuthPhase::Init {
            return Err(Error::Internal(format!(
                "challenge request in phase {:?}",
                self.phase
            )));
        }
        write_function_header(buf, FunctionCode::AuthPhaseOne, sequence)?;

        let user = self.username.as_bytes();
        buf.write_u8(1)?; // user pointer
        buf.write_ub4(user.len() as u32)?;
        buf.write_ub4(self.mode)?;
        buf.write_u8(1)?; // key/value list pointer
        buf.write_ub4(5)?; // pair count
        buf.write_u8(1)?; // output list pointer
        buf.write_u8(1)?; // output count pointer
        buf.write_bytes_with_length(user)?;

        buf.write_key_value("AUTH_TERMINAL", &self.client_info.terminal, 0)?;
        buf.write_key_value("AUTH_PROGRAM_NM", &self.client_info.program, 0)?;
        buf.write_key_value("AUTH_MACHINE", &self.client_info.machine, 0)?;
        buf.write_key_value("AUTH_PID", &self.client_info.pid, 0)?;
        buf.write_key_value("AUTH_SID", &self.client_info.osuser, 0)?;

        self.phase = AuthPhase::ChallengeRequested;
        Ok(())
    }

    /// Record the server's challenge parameters
    pub fn process_challenge(&mut self, pairs: &HashMap<String, String>) -> Result<()> {
        if self.phase != AuthPhase::ChallengeRequested {
            return Err(Error::Internal(format!(
                "challenge response in phase {:?}",
                self.phase
            )));
        }
        self.session_data.absorb(pairs);
        if self.session_data.auth_sesskey.is_none() || self.session_data.auth_vfr_data.is_none() {
            return Err(Error::AuthenticationFailed(
                "server challenge missing session key or verifier data".into(),
            ));
        }
        self.phase = AuthPhase::ChallengeReceived;
        Ok(())
    }

    /// Compute the verifier and write the logon (phase two) message body
    pub fn write_verifier(&mut self, buf: &mut WriteBuffer, sequence: u8) -> Result<()> {
        if self.phase != AuthPhase::ChallengeReceived {
            return Err(Error::Internal(format!(
                "verifier requested in phase {:?}",
                self.phase
            )));
        }

        let verifier = self.compute_verifier()?;
        write_function_header(buf, FunctionCode::AuthPhaseTwo, sequence)?;

        let mut pairs: Vec<(String, String)> = vec![
            ("AUTH_SESSKEY".into(), verifier.client_sesskey_hex),
            ("AUTH_PASSWORD".into(), verifier.encrypted_password_hex),
        ];
        if let Some(speedy) = verifier.speedy_key_hex {
            pairs.push(("AUTH_PBKDF2_SPEEDY_KEY".into(), speedy));
        }
        if let Some(new_password) = verifier.encrypted_new_password_hex {
            pairs.push(("AUTH_NEWPASSWORD".into(), new_password));
        }
        if let Some(proxy) = &self.proxy_client {
            pairs.push(("AUTH_PROXY_CLIENT".into(), proxy.to_uppercase()));
        }
        pairs.push(("AUTH_TERMINAL".into(), self.client_info.terminal.clone()));
        pairs.push(("AUTH_PROGRAM_NM".into(), self.client_info.program.clone()));
        pairs.push(("AUTH_MACHINE".into(), self.client_info.machine.clone()));
        pairs.push(("AUTH_PID".into(), self.client_info.pid.clone()));

        let user = self.username.as_bytes();
        buf.write_u8(1)?;
        buf.write_ub4(user.len() as u32)?;
        buf.write_ub4(self.mode)?;
        buf.write_u8(1)?;
        buf.write_ub4(pairs.len() as u32)?;
        buf.write_u8(1)?;
        buf.write_u8(1)?;
        buf.write_bytes_with_length(user)?;
        for (key, value) in &pairs {
            buf.write_key_value(key, value, 0)?;
        }

        self.phase = AuthPhase::VerifierSent;
        Ok(())
    }

    /// Record the server's logon verdict
    pub fn process_logon_response(&mut self, pairs: &HashMap<String, String>) -> Result<()> {
        if self.phase != AuthPhase::VerifierSent {
            return Err(Error::Internal(format!(
                "logon response in phase {:?}",
                self.phase
            )));
        }
        self.session_data.absorb(pairs);
        self.phase = AuthPhase::Authenticated;
        // the cleartext password is no longer needed
        self.password.clear();
        if let Some(p) = &mut self.new_password {
            p.clear();
        }
        Ok(())
    }

    fn compute_verifier(&self) -> Result<ComputedVerifier> {
        let data = &self.session_data;
        let verifier_type = VerifierType::try_from(
            data.verifier_type
                .unwrap_or(crate::constants::verifier_type::V12C),
        )?;
        let verifier_data = hex::decode(data.auth_vfr_data.as_deref().unwrap_or_default())
            .map_err(|_| Error::AuthenticationFailed("verifier data is not valid hex".into()))?;
        let server_sesskey = hex::decode(data.auth_sesskey.as_deref().unwrap_or_default())
            .map_err(|_| Error::AuthenticationFailed("session key is not valid hex".into()))?;

        // legacy verifiers fold the password case like the server does
        let password: Vec<u8> = match verifier_type {
            VerifierType::V11g1 | VerifierType::V11g2 => {
                String::from_utf8_lossy(&self.password).to_uppercase().into_bytes()
            }
            VerifierType::V12c => self.password.clone(),
        };

        match verifier_type {
            VerifierType::V12c => {
                let iterations = data.auth_pbkdf2_vgen_count.unwrap_or(4096);
                let password_key = password_key_12c(&password, &verifier_data, iterations);
                let password_hash = password_hash_12c(&password, &verifier_data, iterations);

                let server_key = decrypt_cbc_256(&password_hash, &server_sesskey)?;
                let client_key = crypto::generate_session_key_half(32);
                let client_sesskey = encrypt_cbc_256_pkcs7(&password_hash, &client_key)?;

                let csk_salt = hex::decode(
                    data.auth_pbkdf2_csk_salt.as_deref().unwrap_or_default(),
                )
                .map_err(|_| {
                    Error::AuthenticationFailed("combo key salt is not valid hex".into())
                })?;
                let sder_count = data.auth_pbkdf2_sder_count.unwrap_or(3);
                let combo = combo_key_12c(&server_key, &client_key, &csk_salt, sder_count)?;

                let mut salted = crypto::generate_salt().to_vec();
                salted.extend_from_slice(&password);
                let encrypted_password = encrypt_cbc_256_pkcs7(&combo, &salted)?;

                let mut speedy = crypto::generate_salt().to_vec();
                speedy.extend_from_slice(&password_key);
                let speedy_encrypted = encrypt_cbc_256_pkcs7(&combo, &speedy)?;

                let encrypted_new_password_hex = match &self.new_password {
                    Some(new_password) => {
                        let mut salted = crypto::generate_salt().to_vec();
                        salted.extend_from_slice(new_password);
                        Some(hex::encode_upper(encrypt_cbc_256_pkcs7(&combo, &salted)?))
                    }
                    None => None,
                };

                Ok(ComputedVerifier {
                    client_sesskey_hex: hex::encode_upper(&client_sesskey[..32]),
                    encrypted_password_hex: hex::encode_upper(&encrypted_password),
                    speedy_key_hex: Some(hex::encode_upper(&speedy_encrypted[..80])),
                    encrypted_new_password_hex,
                })
            }
            VerifierType::V11g1 | VerifierType::V11g2 => {
                let password_hash = password_hash_11g(&password, &verifier_data);
                let server_key = decrypt_cbc_192(&password_hash, &server_sesskey)?;
                let client_key = crypto::generate_session_key_half(40);
                let client_sesskey = encrypt_cbc_192(&password_hash, &client_key)?;

                let combo = combo_key_11g(&server_key, &client_key)?;
                let mut salted = crypto::generate_salt().to_vec();
                salted.extend_from_slice(&password);
                let encrypted_password = encrypt_cbc_192(&combo, &salted)?;

                let encrypted_new_password_hex = match &self.new_password {
                    Some(new_password) => {
                        let mut salted = crypto::generate_salt().to_vec();
                        salted.extend_from_slice(new_password);
                        Some(hex::encode_upper(encrypt_cbc_192(&combo, &salted)?))
                    }
                    None => None,
                };

                Ok(ComputedVerifier {
                    client_sesskey_hex: hex::encode_upper(&client_sesskey[..40]),
                    encrypted_password_hex: hex::encode_upper(&encrypted_password),
                    speedy_key_hex: None,
                    encrypted_new_password_hex,
                })
            }
        }
    }
}

struct ComputedVerifier {
    client_sesskey_hex: String,
    encrypted_password_hex: String,
    speedy_key_hex: Option<String>,
    encrypted_new_password_hex: Option<String>,
}

/// Map a logon failure code to the authentication error surface
pub fn classify_auth_error(code: u32, message: String) -> Error {
    match code {
        1017 => Error::AuthenticationFailed("invalid username or password".into()),
        28000 => Error::AuthenticationFailed("account is locked".into()),
        28001 => Error::AuthenticationFailed("password has expired".into()),
        _ => Error::OracleError {
            code,
            message,
            offset: 0,
        },
    }
}
