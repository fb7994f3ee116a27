use alloy_primitives::{
    Address,
    U256,
    address,
};

pub const LOTTERY_CONTRACT_ADDRESS: Address =
    address!("5FbDB2315678afecb367f032d93F642f64180aa3");

/// 0.01 ether, in wei.
pub const LOTTERY_ENTRANCE_FEE: U256 =
    U256::from_limbs([10_000_000_000_000_000, 0, 0, 0]);

/// Sepolia.
pub const SUPPORTED_CHAIN_ID: u64 = 11_155_111;
pub const SUPPORTED_CHAIN_ID_HEX: &str = "0xaa36a7";

/// Function and event signatures of the lottery contract ABI.
pub mod abi {
    pub const GET_NUMBER_OF_PLAYERS: &str = "getNumberOfPlayers()";
    pub const GET_RECENT_WINNER: &str = "getRecentWinner()";
    pub const ENTER_LOTTERY: &str = "enterLottery()";
    pub const LOTTERY_ENTER_EVENT: &str = "LotteryEnter(address)";
}

pub const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;
