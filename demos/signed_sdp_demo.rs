//! # Signed SDP Demo
//!
//! Demonstrates the signed session-description envelope that authenticates
//! WebRTC signaling before a peer channel opens.
//!
//! ## Run
//!
//! ```bash
//! cargo run --example signed_sdp_demo
//! ```

use murmur_core::crypto::{sign_sdp, verify_sdp, SigningKeyPair};

fn main() {
    println!("=== Murmur Core: Signed SDP Demo ===\n");

    // Step 1: Create a keypair
    println!("Step 1: Creating ECDSA P-384 signing keypair...");
    let keypair = SigningKeyPair::generate();
    println!(
        "  Public key (JWK): {}",
        keypair.public_jwk().expect("JWK export")
    );
    println!();

    // Step 2: Sign a session description
    println!("Step 2: Signing a session description...");
    let sdp = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\n";
    let envelope = sign_sdp(&keypair, sdp).expect("signing");
    println!("  Envelope: {}", envelope);
    println!();

    // Step 3: Verify it, as the counterparty would
    println!("Step 3: Verifying the envelope...");
    let verified = verify_sdp(&envelope).expect("well-formed envelope");
    println!("  verified = {}", verified.verified);
    println!("  sdp round-trips = {}", verified.sdp == sdp);
    println!();

    // Step 4: Tamper with the SDP and watch verification fail
    println!("Step 4: Tampering with the SDP...");
    let tampered = envelope.replacen("127.0.0.1", "10.6.6.6", 1);
    let verified = verify_sdp(&tampered).expect("still well-formed");
    println!("  verified after tamper = {}", verified.verified);
    println!();

    println!("A peer is only ever signaled (and never handed to the");
    println!("application) unless its envelope verified, so every connected");
    println!("peer is bound to the key that signed its descriptions.");
}
