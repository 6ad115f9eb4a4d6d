fn main() {
    finrag_lib::run()
}
