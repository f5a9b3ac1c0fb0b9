//! Typed payloads for every message that carries one.
//!
//! Two flag conventions coexist on this wire and both are preserved:
//! the auth responses carry `u8 ok` where `1` means success, while the file
//! transfer responses carry `u8 status` where `0` means success.

use crate::wire::{put_str, put_u32, put_u64, put_u8, PayloadReader, WireError};

/// REGISTER_REQ (10): username, email, password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, &self.username);
        put_str(&mut buf, &self.email);
        put_str(&mut buf, &self.password);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            username: r.read_string("username")?,
            email: r.read_string("email")?,
            password: r.read_string("password")?,
        })
    }
}

/// REGISTER_RESP (11): `u8 ok` (1 = success), message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResp {
    pub ok: bool,
    pub message: String,
}

impl RegisterResp {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u8(&mut buf, self.ok as u8);
        put_str(&mut buf, &self.message);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            ok: r.read_u8("ok")? == 1,
            message: r.read_string("message")?,
        })
    }
}

/// LOGIN_REQ (12): username, password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

impl LoginReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, &self.username);
        put_str(&mut buf, &self.password);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            username: r.read_string("username")?,
            password: r.read_string("password")?,
        })
    }
}

/// LOGIN_RESP (13): `u8 ok`; on success token, `i64` user id and canonical
/// username precede the trailing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResp {
    pub ok: bool,
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub message: String,
}

impl LoginResp {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            token: String::new(),
            user_id: 0,
            username: String::new(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u8(&mut buf, self.ok as u8);
        if self.ok {
            put_str(&mut buf, &self.token);
            crate::wire::put_i64(&mut buf, self.user_id);
            put_str(&mut buf, &self.username);
        }
        put_str(&mut buf, &self.message);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        let ok = r.read_u8("ok")? == 1;
        let (token, user_id, username) = if ok {
            (
                r.read_string("token")?,
                r.read_i64("user_id")?,
                r.read_string("username")?,
            )
        } else {
            (String::new(), 0, String::new())
        };
        Ok(Self {
            ok,
            token,
            user_id,
            username,
            message: r.read_string("message")?,
        })
    }
}

/// ONLINE_LIST_RESP (21): `u16 count`, then that many usernames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineListResp {
    pub usernames: Vec<String>,
}

impl OnlineListResp {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        crate::wire::put_u16(&mut buf, self.usernames.len() as u16);
        for name in &self.usernames {
            put_str(&mut buf, name);
        }
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        let count = r.read_u16("count")?;
        let mut usernames = Vec::with_capacity(count as usize);
        for _ in 0..count {
            usernames.push(r.read_string("username")?);
        }
        Ok(Self { usernames })
    }
}

/// FILE_OFFER_REQ (30): client-suggested id (the server assigns its own),
/// receiver username, filename, declared size, requested chunk size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOfferReq {
    pub client_id: u64,
    pub receiver_username: String,
    pub filename: String,
    pub file_size: u64,
    pub chunk_size: u32,
}

impl FileOfferReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u64(&mut buf, self.client_id);
        put_str(&mut buf, &self.receiver_username);
        put_str(&mut buf, &self.filename);
        put_u64(&mut buf, self.file_size);
        put_u32(&mut buf, self.chunk_size);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            client_id: r.read_u64("client_id")?,
            receiver_username: r.read_string("receiver_username")?,
            filename: r.read_string("filename")?,
            file_size: r.read_u64("file_size")?,
            chunk_size: r.read_u32("chunk_size")?,
        })
    }
}

/// FILE_OFFER_RESP (31): `u8 status` (0 = OK), the assigned transfer id
/// (0 on failure), and a reason only on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOfferResp {
    pub ok: bool,
    pub transfer_id: u64,
    pub reason: String,
}

impl FileOfferResp {
    pub fn success(transfer_id: u64) -> Self {
        Self {
            ok: true,
            transfer_id,
            reason: String::new(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            transfer_id: 0,
            reason: reason.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u8(&mut buf, if self.ok { 0 } else { 1 });
        put_u64(&mut buf, self.transfer_id);
        if !self.ok {
            put_str(&mut buf, &self.reason);
        }
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        let ok = r.read_u8("status")? == 0;
        let transfer_id = r.read_u64("transfer_id")?;
        let reason = if !ok && r.remaining() > 0 {
            r.read_string("reason")?
        } else {
            String::new()
        };
        Ok(Self {
            ok,
            transfer_id,
            reason,
        })
    }
}

/// FILE_ACCEPT_REQ (32): transfer id, `u8 accept` (1 = accept, 0 = reject).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAcceptReq {
    pub transfer_id: u64,
    pub accept: bool,
}

impl FileAcceptReq {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u64(&mut buf, self.transfer_id);
        put_u8(&mut buf, self.accept as u8);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            transfer_id: r.read_u64("transfer_id")?,
            accept: r.read_u8("accept")? == 1,
        })
    }
}

/// FILE_ACCEPT_RESP (33): `u8 status` (0 = OK), reason only on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAcceptResp {
    pub ok: bool,
    pub reason: String,
}

impl FileAcceptResp {
    pub fn success() -> Self {
        Self {
            ok: true,
            reason: String::new(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u8(&mut buf, if self.ok { 0 } else { 1 });
        if !self.ok {
            put_str(&mut buf, &self.reason);
        }
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        let ok = r.read_u8("status")? == 0;
        let reason = if !ok && r.remaining() > 0 {
            r.read_string("reason")?
        } else {
            String::new()
        };
        Ok(Self { ok, reason })
    }
}

/// FILE_CHUNK (34): transfer id, chunk index, then raw chunk bytes to the
/// end of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub transfer_id: u64,
    pub chunk_index: u32,
    pub data: Vec<u8>,
}

impl FileChunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.data.len());
        put_u64(&mut buf, self.transfer_id);
        put_u32(&mut buf, self.chunk_index);
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            transfer_id: r.read_u64("transfer_id")?,
            chunk_index: r.read_u32("chunk_index")?,
            data: r.take_rest(),
        })
    }
}

/// FILE_DONE (35): transfer id, total chunk count, declared size again as a
/// cross-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDone {
    pub transfer_id: u64,
    pub total_chunks: u32,
    pub file_size: u64,
}

impl FileDone {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u64(&mut buf, self.transfer_id);
        put_u32(&mut buf, self.total_chunks);
        put_u64(&mut buf, self.file_size);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        Ok(Self {
            transfer_id: r.read_u64("transfer_id")?,
            total_chunks: r.read_u32("total_chunks")?,
            file_size: r.read_u64("file_size")?,
        })
    }
}

/// FILE_RESULT (36): transfer id, `u8 status` (0 = OK), then the saved path
/// on success or the failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub transfer_id: u64,
    pub ok: bool,
    pub path_or_reason: String,
}

impl FileResult {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_u64(&mut buf, self.transfer_id);
        put_u8(&mut buf, if self.ok { 0 } else { 1 });
        put_str(&mut buf, &self.path_or_reason);
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = PayloadReader::new(payload);
        let transfer_id = r.read_u64("transfer_id")?;
        let ok = r.read_u8("status")? == 0;
        let path_or_reason = if r.remaining() > 0 {
            r.read_string("path_or_reason")?
        } else {
            String::new()
        };
        Ok(Self {
            transfer_id,
            ok,
            path_or_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_req_roundtrip() {
        let req = RegisterReq {
            username: "alice".into(),
            email: "a@x".into(),
            password: "pw12345".into(),
        };
        assert_eq!(RegisterReq::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn register_resp_ok_byte_is_one_for_success() {
        let resp = RegisterResp {
            ok: true,
            message: "user created successfully".into(),
        };
        let bytes = resp.encode();
        assert_eq!(bytes[0], 1);
        assert_eq!(RegisterResp::decode(&bytes).unwrap(), resp);
    }

    #[test]
    fn login_req_roundtrip() {
        let req = LoginReq {
            username: "bob".into(),
            password: "secret".into(),
        };
        assert_eq!(LoginReq::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn login_resp_success_roundtrip() {
        let resp = LoginResp {
            ok: true,
            token: "ab".repeat(32),
            user_id: 42,
            username: "alice".into(),
            message: "login successful".into(),
        };
        assert_eq!(LoginResp::decode(&resp.encode()).unwrap(), resp);
    }

    #[test]
    fn login_resp_failure_omits_identity_fields() {
        let resp = LoginResp::failure("invalid username or password");
        let bytes = resp.encode();
        // flag, message length prefix, message; nothing else
        assert_eq!(bytes.len(), 1 + 2 + resp.message.len());
        assert_eq!(LoginResp::decode(&bytes).unwrap(), resp);
    }

    #[test]
    fn online_list_roundtrip() {
        let resp = OnlineListResp {
            usernames: vec!["alice".into(), "bob".into()],
        };
        let bytes = resp.encode();
        assert_eq!(bytes[0..2], [0, 2]);
        assert_eq!(OnlineListResp::decode(&bytes).unwrap(), resp);
    }

    #[test]
    fn online_list_empty_roundtrip() {
        let resp = OnlineListResp { usernames: vec![] };
        assert_eq!(OnlineListResp::decode(&resp.encode()).unwrap(), resp);
    }

    #[test]
    fn file_offer_req_roundtrip() {
        let req = FileOfferReq {
            client_id: 7,
            receiver_username: "bob".into(),
            filename: "g.txt".into(),
            file_size: 6,
            chunk_size: 262_144,
        };
        assert_eq!(FileOfferReq::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn file_offer_resp_status_byte_is_zero_for_success() {
        let resp = FileOfferResp::success(9);
        let bytes = resp.encode();
        assert_eq!(bytes[0], 0);
        // transfer id is always present, reason only on failure
        assert_eq!(bytes.len(), 9);
        assert_eq!(FileOfferResp::decode(&bytes).unwrap(), resp);
    }

    #[test]
    fn file_offer_resp_failure_carries_zero_id_and_reason() {
        let resp = FileOfferResp::failure("Receiver not found");
        let bytes = resp.encode();
        assert_eq!(bytes[0], 1);
        let decoded = FileOfferResp::decode(&bytes).unwrap();
        assert_eq!(decoded.transfer_id, 0);
        assert_eq!(decoded.reason, "Receiver not found");
        assert_eq!(decoded, resp);
    }

    #[test]
    fn file_accept_req_roundtrip() {
        for accept in [true, false] {
            let req = FileAcceptReq {
                transfer_id: 3,
                accept,
            };
            assert_eq!(FileAcceptReq::decode(&req.encode()).unwrap(), req);
        }
    }

    #[test]
    fn file_accept_resp_roundtrip() {
        let ok = FileAcceptResp::success();
        assert_eq!(ok.encode(), vec![0]);
        assert_eq!(FileAcceptResp::decode(&ok.encode()).unwrap(), ok);

        let fail = FileAcceptResp::failure("Receiver rejected");
        assert_eq!(FileAcceptResp::decode(&fail.encode()).unwrap(), fail);
    }

    #[test]
    fn file_chunk_roundtrip() {
        let chunk = FileChunk {
            transfer_id: 1,
            chunk_index: 0,
            data: b"hello\n".to_vec(),
        };
        assert_eq!(FileChunk::decode(&chunk.encode()).unwrap(), chunk);
    }

    #[test]
    fn file_chunk_empty_data_roundtrip() {
        let chunk = FileChunk {
            transfer_id: 1,
            chunk_index: 4,
            data: vec![],
        };
        assert_eq!(FileChunk::decode(&chunk.encode()).unwrap(), chunk);
    }

    #[test]
    fn file_done_roundtrip() {
        let done = FileDone {
            transfer_id: 1,
            total_chunks: 1,
            file_size: 6,
        };
        assert_eq!(done.encode().len(), 20);
        assert_eq!(FileDone::decode(&done.encode()).unwrap(), done);
    }

    #[test]
    fn file_result_roundtrip() {
        let result = FileResult {
            transfer_id: 1,
            ok: true,
            path_or_reason: "./storage/transfers/1/g.txt".into(),
        };
        assert_eq!(FileResult::decode(&result.encode()).unwrap(), result);

        let fail = FileResult {
            transfer_id: 2,
            ok: false,
            path_or_reason: "Failed to finalize file".into(),
        };
        assert_eq!(FileResult::decode(&fail.encode()).unwrap(), fail);
    }

    #[test]
    fn truncated_payload_errors() {
        assert!(RegisterReq::decode(&[0, 5, b'a']).is_err());
        assert!(LoginResp::decode(&[]).is_err());
        assert!(FileOfferReq::decode(&[0; 8]).is_err());
        assert!(FileChunk::decode(&[0; 11]).is_err());
        assert!(FileDone::decode(&[0; 15]).is_err());
    }
}
